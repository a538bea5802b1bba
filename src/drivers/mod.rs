// Wand Inference - Sensor Drivers
//
// Everything the sampling task reads from implements `SampleSource`: the
// MPU6050 on the device, recorded rows on the host and in tests.

#[cfg(target_os = "espidf")]
pub mod imu;
pub mod replay;

use crate::error::SensorError;

pub type Triple = (f32, f32, f32);

/// Pull interface over a 6-axis IMU. Accel in g, gyro in °/s.
pub trait SampleSource: Send {
    fn read_accel(&mut self) -> Result<Triple, SensorError>;
    fn read_gyro(&mut self) -> Result<Triple, SensorError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn read_accel(&mut self) -> Result<Triple, SensorError> {
        (**self).read_accel()
    }

    fn read_gyro(&mut self) -> Result<Triple, SensorError> {
        (**self).read_gyro()
    }
}
