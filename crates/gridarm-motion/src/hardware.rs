//! Hardware actuation capability and the vendor servo SDK binding.
//!
//! The SDK is a C library (`librisdk.so` / `librisdk.dll`) loaded at runtime via
//! `libloading`. Every call takes a 1000-byte error text buffer and returns a
//! non-zero code on failure.

use crate::error::{MotionError, MotionResult};
use crate::joint::{JointId, Pulse, JOINT_COUNT};
use libloading::Library;
use serde::{Deserialize, Serialize};
use std::ffi::{c_char, c_int, CStr, CString};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Something that can drive servo channels.
///
/// `initialize` must succeed before any `write` is issued.
pub trait HardwareActuator: Send {
    /// Bring up the controller chain. Failures are [`MotionError::Configuration`].
    fn initialize(&mut self) -> MotionResult<()>;

    /// Command one joint to a pulse width. Failures are [`MotionError::HardwareWrite`].
    fn write(&mut self, joint: JointId, pulse: Pulse) -> MotionResult<()>;

    /// Number of servo channels this actuator drives.
    fn joint_count(&self) -> usize;
}

impl<T: HardwareActuator + ?Sized> HardwareActuator for Box<T> {
    fn initialize(&mut self) -> MotionResult<()> {
        (**self).initialize()
    }

    fn write(&mut self, joint: JointId, pulse: Pulse) -> MotionResult<()> {
        (**self).write(joint, pulse)
    }

    fn joint_count(&self) -> usize {
        (**self).joint_count()
    }
}

fn default_library_path() -> PathBuf {
    let name = if cfg!(windows) { "librisdk.dll" } else { "librisdk.so" };
    PathBuf::from(name)
}

fn default_log_level() -> i32 {
    2
}

fn default_i2c_address() -> u8 {
    0x40
}

fn default_joint_count() -> usize {
    JOINT_COUNT
}

/// Settings for the vendor SDK controller chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Path of the SDK shared library (default: `librisdk.so` / `librisdk.dll` in the working directory).
    #[serde(default = "default_library_path")]
    pub library_path: PathBuf,
    /// SDK log level passed to `RI_SDK_InitSDK`.
    #[serde(default = "default_log_level")]
    pub log_level: i32,
    /// I2C address of the PCA9685 PWM board.
    #[serde(default = "default_i2c_address")]
    pub i2c_address: u8,
    /// Servo drives to create, linked to PWM ports `0..joint_count`.
    #[serde(default = "default_joint_count")]
    pub joint_count: usize,
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            library_path: default_library_path(),
            log_level: default_log_level(),
            i2c_address: default_i2c_address(),
            joint_count: default_joint_count(),
        }
    }
}

const ERR_TEXT_LEN: usize = 1000;

type InitSdkFn = unsafe extern "C" fn(c_int, *mut c_char) -> c_int;
type CreateComponentFn =
    unsafe extern "C" fn(*const c_char, *const c_char, *const c_char, *mut c_int, *mut c_char) -> c_int;
type LinkPwmFn = unsafe extern "C" fn(c_int, c_int, u8, *mut c_char) -> c_int;
type LinkServoFn = unsafe extern "C" fn(c_int, c_int, c_int, *mut c_char) -> c_int;
type TurnByPulseFn = unsafe extern "C" fn(c_int, c_int, *mut c_char) -> c_int;

struct SdkSymbols {
    init_sdk: InitSdkFn,
    create_component: CreateComponentFn,
    link_pwm: LinkPwmFn,
    link_servo: LinkServoFn,
    turn_by_pulse: TurnByPulseFn,
}

/// Run one SDK call with a fresh error buffer; non-zero return becomes the buffer text.
fn sdk_call(call: impl FnOnce(*mut c_char) -> c_int) -> Result<(), String> {
    let mut err_text = [0 as c_char; ERR_TEXT_LEN];
    let code = call(err_text.as_mut_ptr());
    if code == 0 {
        return Ok(());
    }
    err_text[ERR_TEXT_LEN - 1] = 0;
    // SAFETY: the buffer is zero-initialised and its last byte forced to NUL.
    let text = unsafe { CStr::from_ptr(err_text.as_ptr()) }
        .to_string_lossy()
        .trim()
        .to_string();
    Err(if text.is_empty() { format!("SDK error code {}", code) } else { text })
}

/// Servo controller driven through the vendor SDK: CH341 USB-I2C adapter, PCA9685 PWM board,
/// MG90S servo drives.
pub struct RiSdkActuator {
    config: SdkConfig,
    symbols: SdkSymbols,
    servos: Vec<c_int>,
    // Keeps the function pointers in `symbols` valid.
    _lib: Library,
}

impl RiSdkActuator {
    /// Load the SDK shared library and resolve its entry points. Does not touch the hardware.
    pub fn load(config: SdkConfig) -> MotionResult<Self> {
        let path: &Path = &config.library_path;
        // SAFETY: loading a vendor library runs its initialisers; the path is operator-configured.
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            MotionError::Configuration(format!("loading {}: {}", path.display(), e))
        })?;
        let symbols = unsafe {
            SdkSymbols {
                init_sdk: *lib
                    .get::<InitSdkFn>(b"RI_SDK_InitSDK")
                    .map_err(|e| symbol_error("RI_SDK_InitSDK", e))?,
                create_component: *lib
                    .get::<CreateComponentFn>(b"RI_SDK_CreateModelComponent")
                    .map_err(|e| symbol_error("RI_SDK_CreateModelComponent", e))?,
                link_pwm: *lib
                    .get::<LinkPwmFn>(b"RI_SDK_LinkPWMToController")
                    .map_err(|e| symbol_error("RI_SDK_LinkPWMToController", e))?,
                link_servo: *lib
                    .get::<LinkServoFn>(b"RI_SDK_LinkServodriveToController")
                    .map_err(|e| symbol_error("RI_SDK_LinkServodriveToController", e))?,
                turn_by_pulse: *lib
                    .get::<TurnByPulseFn>(b"RI_SDK_exec_ServoDrive_TurnByPulse")
                    .map_err(|e| symbol_error("RI_SDK_exec_ServoDrive_TurnByPulse", e))?,
            }
        };
        info!(path = %path.display(), "servo SDK loaded");
        Ok(Self {
            config,
            symbols,
            servos: Vec::new(),
            _lib: lib,
        })
    }

    fn create_component(&self, group: &str, device: &str, model: &str) -> MotionResult<c_int> {
        let to_c = |s: &str| {
            CString::new(s).map_err(|e| MotionError::Configuration(format!("component name {}: {}", s, e)))
        };
        let (group_c, device_c, model_c) = (to_c(group)?, to_c(device)?, to_c(model)?);
        let mut descriptor: c_int = 0;
        let create = self.symbols.create_component;
        sdk_call(|err| unsafe {
            create(group_c.as_ptr(), device_c.as_ptr(), model_c.as_ptr(), &mut descriptor, err)
        })
        .map_err(|e| MotionError::Configuration(format!("create {} {}: {}", device, model, e)))?;
        debug!(device, model, descriptor, "SDK component created");
        Ok(descriptor)
    }
}

fn symbol_error(name: &str, err: libloading::Error) -> MotionError {
    MotionError::Configuration(format!("symbol {}: {}", name, err))
}

impl HardwareActuator for RiSdkActuator {
    fn initialize(&mut self) -> MotionResult<()> {
        let init = self.symbols.init_sdk;
        let log_level = self.config.log_level;
        sdk_call(|err| unsafe { init(log_level, err) })
            .map_err(|e| MotionError::Configuration(format!("SDK init: {}", e)))?;

        let pwm = self.create_component("connector", "pwm", "pca9685")?;
        let i2c = self.create_component("connector", "i2c_adapter", "ch341")?;

        let link_pwm = self.symbols.link_pwm;
        let address = self.config.i2c_address;
        sdk_call(|err| unsafe { link_pwm(pwm, i2c, address, err) })
            .map_err(|e| MotionError::Configuration(format!("link PWM to I2C: {}", e)))?;

        let link_servo = self.symbols.link_servo;
        let mut servos = Vec::with_capacity(self.config.joint_count);
        for port in 0..self.config.joint_count {
            let servo = self.create_component("executor", "servodrive", "mg90s")?;
            let port_c = port as c_int;
            sdk_call(|err| unsafe { link_servo(servo, pwm, port_c, err) }).map_err(|e| {
                MotionError::Configuration(format!("link servo {}: {}", port, e))
            })?;
            servos.push(servo);
        }
        self.servos = servos;
        info!(joints = self.servos.len(), i2c_address = address, "servo controller initialized");
        Ok(())
    }

    fn write(&mut self, joint: JointId, pulse: Pulse) -> MotionResult<()> {
        let servo = *self.servos.get(joint).ok_or_else(|| MotionError::HardwareWrite {
            joint,
            message: "servo not initialized".to_string(),
        })?;
        let turn = self.symbols.turn_by_pulse;
        sdk_call(|err| unsafe { turn(servo, pulse as c_int, err) })
            .map_err(|message| MotionError::HardwareWrite { joint, message })
    }

    fn joint_count(&self) -> usize {
        self.config.joint_count
    }
}
