// Wand Inference - Replay Source
//
// Serves recorded IMU rows in order, one row per accel+gyro read pair, and
// reports `SensorError::Exhausted` once the recording runs out.

use crate::drivers::{SampleSource, Triple};
use crate::error::SensorError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayRow {
    pub timestamp_ms: u32,
    pub accel: Triple,
    pub gyro: Triple,
}

#[derive(Debug, Clone)]
pub struct ReplaySource {
    rows: Vec<ReplayRow>,
    next: usize,
}

impl ReplaySource {
    pub fn new(rows: Vec<ReplayRow>) -> Self {
        Self { rows, next: 0 }
    }

    /// Rows not yet consumed.
    pub fn remaining(&self) -> usize {
        self.rows.len() - self.next
    }

    fn current(&self) -> Result<&ReplayRow, SensorError> {
        self.rows.get(self.next).ok_or(SensorError::Exhausted)
    }

    /// Parse `timestamp,accX,accY,accZ,gyrX,gyrY,gyrZ` rows with a header line.
    #[cfg(not(target_os = "espidf"))]
    pub fn from_csv<R: std::io::Read>(reader: R) -> anyhow::Result<Self> {
        use anyhow::{ensure, Context};

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for (row_idx, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("invalid CSV row {}", row_idx + 1))?;
            ensure!(
                record.len() >= 7,
                "row {} has {} columns, expected 7",
                row_idx + 1,
                record.len()
            );

            let field = |i: usize| -> anyhow::Result<f32> {
                record[i]
                    .parse::<f32>()
                    .with_context(|| format!("bad value {:?} in row {}", &record[i], row_idx + 1))
            };
            let timestamp = field(0)?;
            rows.push(ReplayRow {
                timestamp_ms: timestamp.max(0.0) as u32,
                accel: (field(1)?, field(2)?, field(3)?),
                gyro: (field(4)?, field(5)?, field(6)?),
            });
        }

        ensure!(!rows.is_empty(), "CSV contains no readings");
        Ok(Self::new(rows))
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn from_csv_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("could not open {}", path.display()))?;
        Self::from_csv(file).with_context(|| format!("while reading {}", path.display()))
    }

    /// Join several recordings back to back.
    pub fn chain(sources: impl IntoIterator<Item = ReplaySource>) -> Self {
        let rows = sources
            .into_iter()
            .flat_map(|s| s.rows.into_iter().skip(s.next))
            .collect();
        Self::new(rows)
    }
}

impl SampleSource for ReplaySource {
    fn read_accel(&mut self) -> Result<Triple, SensorError> {
        Ok(self.current()?.accel)
    }

    /// Completes the current row.
    fn read_gyro(&mut self) -> Result<Triple, SensorError> {
        let gyro = self.current()?.gyro;
        self.next += 1;
        Ok(gyro)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORDING: &str = "\
timestamp,accX,accY,accZ,gyrX,gyrY,gyrZ
0,-0.98,0.13,0.14,6.16,14.10,-3.78
10,-1.00,0.14,0.17,12.94,12.27,-6.16
";

    #[test]
    fn parses_csv_rows() {
        let source = ReplaySource::from_csv(RECORDING.as_bytes()).unwrap();
        assert_eq!(source.remaining(), 2);
        assert_eq!(source.rows[1].timestamp_ms, 10);
        assert_eq!(source.rows[0].accel, (-0.98, 0.13, 0.14));
        assert_eq!(source.rows[1].gyro, (12.94, 12.27, -6.16));
    }

    #[test]
    fn rejects_short_and_empty_files() {
        assert!(ReplaySource::from_csv("timestamp,accX\n0,1.0\n".as_bytes()).is_err());
        assert!(ReplaySource::from_csv("timestamp,accX,accY,accZ,gyrX,gyrY,gyrZ\n".as_bytes())
            .is_err());
        assert!(ReplaySource::from_csv("t,a,b,c,d,e,f\n0,x,0,0,0,0,0\n".as_bytes()).is_err());
    }

    #[test]
    fn serves_rows_in_order_then_exhausts() {
        let mut source = ReplaySource::from_csv(RECORDING.as_bytes()).unwrap();
        assert_eq!(source.read_accel().unwrap(), (-0.98, 0.13, 0.14));
        assert_eq!(source.read_accel().unwrap(), (-0.98, 0.13, 0.14));
        assert_eq!(source.read_gyro().unwrap(), (6.16, 14.10, -3.78));
        assert_eq!(source.read_accel().unwrap().0, -1.00);
        assert_eq!(source.read_gyro().unwrap().0, 12.94);
        assert_eq!(source.read_accel(), Err(SensorError::Exhausted));
        assert_eq!(source.read_gyro(), Err(SensorError::Exhausted));
    }

    #[test]
    fn chain_skips_consumed_rows() {
        let mut first = ReplaySource::from_csv(RECORDING.as_bytes()).unwrap();
        first.read_gyro().unwrap();
        let second = ReplaySource::from_csv(RECORDING.as_bytes()).unwrap();
        let joined = ReplaySource::chain([first, second]);
        assert_eq!(joined.remaining(), 3);
    }
}
