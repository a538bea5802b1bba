// Wand Inference - MPU6050 IMU Driver
//
// Register-level driver over a shared I2C bus, read as a `SampleSource`.
// Avoids external crate version conflicts with esp-idf-hal.

use std::sync::{Mutex, MutexGuard, PoisonError};

use esp_idf_hal::i2c::I2cDriver;

use crate::drivers::{SampleSource, Triple};
use crate::error::SensorError;

/// Thread-safe handle to a shared I2C bus.
pub type SharedBus = &'static Mutex<I2cDriver<'static>>;

const I2C_ADDR_MPU6050: u8 = 0x68;
const I2C_TIMEOUT_TICKS: u32 = 1000; // FreeRTOS ticks

// MPU6050 register addresses
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_GYRO_XOUT_H: u8 = 0x43;
const REG_WHO_AM_I: u8 = 0x75;
const WHO_AM_I_EXPECTED: u8 = 0x68;

// Scale factors for the ranges set in `init`
const ACCEL_SCALE_4G: f32 = 8192.0; // LSB/g at ±4 g
const GYRO_SCALE_2000: f32 = 16.4; // LSB/°/s at ±2000 °/s

pub struct Mpu6050 {
    bus: SharedBus,
}

impl Mpu6050 {
    pub fn new(bus: SharedBus) -> Self {
        Self { bus }
    }

    fn bus(&self) -> MutexGuard<'_, I2cDriver<'static>> {
        self.bus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Verify the device is reachable on the I2C bus.
    pub fn is_connected(&self) -> bool {
        let mut buf = [0u8; 1];
        match self
            .bus()
            .write_read(I2C_ADDR_MPU6050, &[REG_WHO_AM_I], &mut buf, I2C_TIMEOUT_TICKS)
        {
            Ok(()) => buf[0] == WHO_AM_I_EXPECTED,
            Err(_) => false,
        }
    }

    /// Wake the sensor and configure accel (±4 g), gyro (±2000 °/s), DLPF 44 Hz.
    /// The wide gyro range matches the recorded wand gestures.
    pub fn init(&self) -> anyhow::Result<()> {
        let mut bus = self.bus();

        // Wake up (clear SLEEP bit)
        bus.write(I2C_ADDR_MPU6050, &[REG_PWR_MGMT_1, 0x00], I2C_TIMEOUT_TICKS)?;
        bus.write(I2C_ADDR_MPU6050, &[REG_CONFIG, 0x03], I2C_TIMEOUT_TICKS)?;
        bus.write(I2C_ADDR_MPU6050, &[REG_GYRO_CONFIG, 0x18], I2C_TIMEOUT_TICKS)?;
        bus.write(I2C_ADDR_MPU6050, &[REG_ACCEL_CONFIG, 0x08], I2C_TIMEOUT_TICKS)?;

        log::info!("MPU6050 initialised (±4g, ±2000°/s, DLPF 44Hz)");
        Ok(())
    }

    fn read_axes(&self, reg: u8, scale: f32) -> Result<Triple, SensorError> {
        let mut raw = [0u8; 6];
        self.bus()
            .write_read(I2C_ADDR_MPU6050, &[reg], &mut raw, I2C_TIMEOUT_TICKS)
            .map_err(|e| SensorError::Read(e.to_string()))?;

        Ok((
            i16::from_be_bytes([raw[0], raw[1]]) as f32 / scale,
            i16::from_be_bytes([raw[2], raw[3]]) as f32 / scale,
            i16::from_be_bytes([raw[4], raw[5]]) as f32 / scale,
        ))
    }
}

impl SampleSource for Mpu6050 {
    fn read_accel(&mut self) -> Result<Triple, SensorError> {
        self.read_axes(REG_ACCEL_XOUT_H, ACCEL_SCALE_4G)
    }

    fn read_gyro(&mut self) -> Result<Triple, SensorError> {
        self.read_axes(REG_GYRO_XOUT_H, GYRO_SCALE_2000)
    }
}
