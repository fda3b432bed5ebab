//! Binary persistence for calibration records
//!
//! The record is stored as a fixed-size little-endian byte image with the
//! field order of [`CalibrationRecord`]: a leading valid byte, then the
//! gyroscope matrix/sensitivity/offset, the accelerometer
//! matrix/sensitivity/offset, the soft iron matrix, and the hard iron
//! offset. Matrices are row-major. There is no checksum and no version
//! field - reordering fields is a breaking, silent incompatibility.
//!
//! All operations are synchronous and never retry. A failed load is not an
//! error; it is the documented signal to fall into a first-run calibration
//! pass.

use nalgebra::{Matrix3, Vector3};

use crate::types::CalibrationRecord;

/// Size of the persisted byte image: 1 valid byte, three 3x3 f32 matrices,
/// five f32 vectors
pub const RECORD_SIZE: usize = 1 + 3 * 36 + 5 * 12;

/// Persistence failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// No record exists on the medium
    NotFound,
    /// The medium failed to read or write
    Io,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StorageError::NotFound => write!(f, "no calibration record found"),
            StorageError::Io => write!(f, "storage medium error"),
        }
    }
}

/// Block-storage seam for the calibration file
///
/// Implementations map onto whatever the platform offers - a flash-backed
/// file, an EEPROM page, a plain file on the host. Reads and writes always
/// address the whole image from the start of the record.
pub trait Storage {
    /// Read up to `buf.len()` bytes from the start of the record, returning
    /// the number of bytes read
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Overwrite the record from the start
    fn write(&mut self, data: &[u8]) -> Result<(), StorageError>;
}

/// Calibration record persistence with the validity protocol
pub struct CalibrationStore<S: Storage> {
    storage: S,
}

impl<S: Storage> CalibrationStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Read the persisted record
    ///
    /// Returns `None` when no record exists, the medium fails, the image is
    /// truncated, or the stored valid flag is false. Logs a human-readable
    /// dump of the loaded values on success.
    pub fn load(&mut self) -> Option<CalibrationRecord> {
        let mut buf = [0u8; RECORD_SIZE];
        let read = match self.storage.read(&mut buf) {
            Ok(read) => read,
            Err(error) => {
                log::info!("no calibration data available ({error}), starting calibration");
                return None;
            }
        };
        if read < RECORD_SIZE {
            log::warn!("calibration record truncated ({read} of {RECORD_SIZE} bytes)");
            return None;
        }

        let record = decode(&buf);
        if !record.valid {
            log::info!("calibration data is invalid, starting calibration");
            return None;
        }

        log::info!("calibration data loaded:");
        log::info!(
            "  gyro offset ({:.6}, {:.6}, {:.6}) sensitivity ({:.6}, {:.6}, {:.6})",
            record.gyroscope_offset.x,
            record.gyroscope_offset.y,
            record.gyroscope_offset.z,
            record.gyroscope_sensitivity.x,
            record.gyroscope_sensitivity.y,
            record.gyroscope_sensitivity.z
        );
        log::info!(
            "  accel offset ({:.6}, {:.6}, {:.6}) sensitivity ({:.6}, {:.6}, {:.6})",
            record.accelerometer_offset.x,
            record.accelerometer_offset.y,
            record.accelerometer_offset.z,
            record.accelerometer_sensitivity.x,
            record.accelerometer_sensitivity.y,
            record.accelerometer_sensitivity.z
        );
        log::info!(
            "  hard iron ({:.6}, {:.6}, {:.6}) soft iron diagonal ({:.6}, {:.6}, {:.6})",
            record.hard_iron_offset.x,
            record.hard_iron_offset.y,
            record.hard_iron_offset.z,
            record.soft_iron_matrix[(0, 0)],
            record.soft_iron_matrix[(1, 1)],
            record.soft_iron_matrix[(2, 2)]
        );
        Some(record)
    }

    /// Persist the record, marking it valid
    ///
    /// Overwrites any prior content wholesale. The record is mutated so the
    /// in-memory copy and the persisted copy agree on the valid flag.
    pub fn save(&mut self, record: &mut CalibrationRecord) -> Result<(), StorageError> {
        record.valid = true;
        match self.storage.write(&encode(record)) {
            Ok(()) => {
                log::info!("calibration data saved");
                Ok(())
            }
            Err(error) => {
                log::error!("failed to save calibration data: {error}");
                Err(error)
            }
        }
    }

    /// Soft-erase the persisted record
    ///
    /// Read-modify-write that flips only the leading valid byte, preserving
    /// every other byte on the medium. Not atomic across power loss: a
    /// failure mid-write can leave an inconsistent image, which is an
    /// accepted risk.
    pub fn invalidate(&mut self) -> Result<(), StorageError> {
        let mut buf = [0u8; RECORD_SIZE];
        let read = self.storage.read(&mut buf).map_err(|error| {
            log::error!("failed to open calibration record for invalidation: {error}");
            error
        })?;
        if read < RECORD_SIZE {
            log::error!("calibration record truncated, nothing to invalidate");
            return Err(StorageError::NotFound);
        }

        buf[0] = 0;
        match self.storage.write(&buf) {
            Ok(()) => {
                log::info!("calibration data invalidated, reboot to recalibrate");
                Ok(())
            }
            Err(error) => {
                log::error!("failed to invalidate calibration data: {error}");
                Err(error)
            }
        }
    }
}

/// Serialize a record into its fixed byte image
pub fn encode(record: &CalibrationRecord) -> [u8; RECORD_SIZE] {
    let mut buf = [0u8; RECORD_SIZE];
    buf[0] = record.valid as u8;

    let mut at = 1;
    put_matrix(&mut buf, &mut at, &record.gyroscope_misalignment);
    put_vector(&mut buf, &mut at, &record.gyroscope_sensitivity);
    put_vector(&mut buf, &mut at, &record.gyroscope_offset);
    put_matrix(&mut buf, &mut at, &record.accelerometer_misalignment);
    put_vector(&mut buf, &mut at, &record.accelerometer_sensitivity);
    put_vector(&mut buf, &mut at, &record.accelerometer_offset);
    put_matrix(&mut buf, &mut at, &record.soft_iron_matrix);
    put_vector(&mut buf, &mut at, &record.hard_iron_offset);
    debug_assert_eq!(at, RECORD_SIZE);
    buf
}

/// Deserialize a record from its fixed byte image
pub fn decode(buf: &[u8; RECORD_SIZE]) -> CalibrationRecord {
    let mut at = 1;
    CalibrationRecord {
        valid: buf[0] != 0,
        gyroscope_misalignment: get_matrix(buf, &mut at),
        gyroscope_sensitivity: get_vector(buf, &mut at),
        gyroscope_offset: get_vector(buf, &mut at),
        accelerometer_misalignment: get_matrix(buf, &mut at),
        accelerometer_sensitivity: get_vector(buf, &mut at),
        accelerometer_offset: get_vector(buf, &mut at),
        soft_iron_matrix: get_matrix(buf, &mut at),
        hard_iron_offset: get_vector(buf, &mut at),
    }
}

fn put_f32(buf: &mut [u8], at: &mut usize, value: f32) {
    buf[*at..*at + 4].copy_from_slice(&value.to_le_bytes());
    *at += 4;
}

fn get_f32(buf: &[u8], at: &mut usize) -> f32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[*at..*at + 4]);
    *at += 4;
    f32::from_le_bytes(bytes)
}

fn put_vector(buf: &mut [u8], at: &mut usize, vector: &Vector3<f32>) {
    put_f32(buf, at, vector.x);
    put_f32(buf, at, vector.y);
    put_f32(buf, at, vector.z);
}

fn get_vector(buf: &[u8], at: &mut usize) -> Vector3<f32> {
    let x = get_f32(buf, at);
    let y = get_f32(buf, at);
    let z = get_f32(buf, at);
    Vector3::new(x, y, z)
}

fn put_matrix(buf: &mut [u8], at: &mut usize, matrix: &Matrix3<f32>) {
    for row in 0..3 {
        for col in 0..3 {
            put_f32(buf, at, matrix[(row, col)]);
        }
    }
}

fn get_matrix(buf: &[u8], at: &mut usize) -> Matrix3<f32> {
    let mut matrix = Matrix3::zeros();
    for row in 0..3 {
        for col in 0..3 {
            matrix[(row, col)] = get_f32(buf, at);
        }
    }
    matrix
}
