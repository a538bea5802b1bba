// Wand Inference - Entry Point
//
// Host: replay one or more recorded CSV files through the pipeline and print
// one report per inference, ending with the `ANS:` line.
//
//     wand-inference [--poll-interval-ms N] alpha.csv [beta.csv ...]
//
// Device (ESP-IDF): sample the MPU6050 on the shared I2C bus forever.
//
// Both spawn the sampling and inference tasks and then sit in a passive loop
// printing what the inference task reports.

use std::sync::mpsc::Receiver;

use wand_inference::events::PipelineEvent;

/// Print every event until the inference task exits and the channel closes.
fn print_reports(events: Receiver<PipelineEvent>) {
    for event in events {
        match event {
            PipelineEvent::Report(report) => println!("{}", report),
            PipelineEvent::Overrun => println!("ERROR: Buffer overrun"),
            PipelineEvent::ClassifierFailed { status, message } => {
                println!("run_classifier returned: {} ({})", status, message);
                println!("---");
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use std::sync::mpsc;

    use clap::Parser;
    use wand_inference::cli::Args;
    use wand_inference::drivers::replay::ReplaySource;
    use wand_inference::{ei, Pipeline};

    let args = Args::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let recordings = args
        .recordings
        .iter()
        .map(ReplaySource::from_csv_path)
        .collect::<anyhow::Result<Vec<_>>>()?;
    let source = ReplaySource::chain(recordings);
    log::info!(
        "Replaying {} readings from {} file(s)",
        source.remaining(),
        args.recordings.len()
    );

    let classifier = ei::default_classifier()?;
    let (events_tx, events_rx) = mpsc::channel();
    let pipeline = Pipeline::start(source, classifier, &args.pipeline_config(), events_tx)?;

    print_reports(events_rx);
    pipeline.join()
}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use std::sync::{mpsc, Mutex};

    use esp_idf_hal::i2c::{I2cConfig, I2cDriver};
    use esp_idf_hal::prelude::*;
    use wand_inference::drivers::imu::Mpu6050;
    use wand_inference::{ei, Pipeline, PipelineConfig};

    // Link esp-idf-sys runtime patches and initialise logging.
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("Wand inference firmware starting");

    let peripherals = Peripherals::take()?;

    let i2c_config = I2cConfig::new().baudrate(400u32.kHz().into());
    let i2c = I2cDriver::new(
        peripherals.i2c0,
        peripherals.pins.gpio6, // SDA
        peripherals.pins.gpio7, // SCL
        &i2c_config,
    )?;
    // SAFETY: The I2C peripheral is a singleton obtained from `Peripherals::take()`.
    // It lives for the entire programme duration (firmware never exits).
    let i2c_bus: &'static Mutex<I2cDriver<'static>> =
        Box::leak(Box::new(Mutex::new(unsafe { core::mem::transmute(i2c) })));

    let imu = Mpu6050::new(i2c_bus);
    if !imu.is_connected() {
        anyhow::bail!("Failed to initialize IMU");
    }
    imu.init()?;

    let classifier = ei::default_classifier()?;
    let (events_tx, events_rx) = mpsc::channel();
    let pipeline = Pipeline::start(imu, classifier, &PipelineConfig::default(), events_tx)?;

    // Runs until the inference task exits, which on the device is never.
    print_reports(events_rx);
    pipeline.join()
}
