pub mod device;
pub mod gateway;
pub mod logcat;

pub use device::Device;
pub use gateway::{
    AdbGateway, CommandOutput, DeviceGateway, GatewayError, GatewayResult, ScriptedGateway,
    split_command,
};
pub use logcat::{LiveTail, Logcat};
