//! # Serialization Utilities
//!
//! Checkpoints of a network's parameters (binary, `bincode`) and JSON helpers
//! for training settings and results (`serde_json`).

use crate::nn::Network;
use crate::tensor::{TensorData, TensorError, Vector};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

// --- Error Type ---
#[derive(thiserror::Error, Debug)]
pub enum SerializationError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization Error (Bincode): {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Serialization Error (JSON): {0}")]
    Json(#[from] serde_json::Error),
    #[error("Checkpoint holds {got} parameters, network expects {expected}")]
    ParameterCountMismatch { expected: usize, got: usize },
    #[error("Could not apply checkpoint: {0}")]
    Tensor(#[from] TensorError),
}

// --- Network Checkpoints ---

/// Snapshot of a network's trainable parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NetworkCheckpoint {
    /// Epoch at which the snapshot was taken.
    pub epoch: usize,
    pub parameters_count: usize,
    pub parameters: Vec<TensorData>,
}

impl NetworkCheckpoint {
    pub fn capture(network: &dyn Network, epoch: usize) -> Self {
        let parameters = network.parameters();
        NetworkCheckpoint {
            epoch,
            parameters_count: parameters.len(),
            parameters: parameters.to_vec(),
        }
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes the network's parameters to `path`.
///
/// The file is written next to the target and renamed into place, so an
/// interrupted write never leaves a truncated checkpoint behind. The
/// temporary file is removed when writing or renaming fails.
pub fn save_checkpoint<P: AsRef<Path>>(
    network: &dyn Network,
    epoch: usize,
    path: P,
) -> Result<(), SerializationError> {
    let path = path.as_ref();
    let checkpoint = NetworkCheckpoint::capture(network, epoch);
    let tmp = temporary_path(path);
    let written = write_then_rename(&checkpoint, &tmp, path);
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

fn write_then_rename(
    checkpoint: &NetworkCheckpoint,
    tmp: &Path,
    path: &Path,
) -> Result<(), SerializationError> {
    {
        let file = File::create(tmp)?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, checkpoint)?;
        writer.flush()?;
    }
    fs::rename(tmp, path)?;
    Ok(())
}

/// Reads a checkpoint written by [`save_checkpoint`].
pub fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<NetworkCheckpoint, SerializationError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    Ok(bincode::deserialize_from(reader)?)
}

/// Loads a checkpoint and writes its parameters into `network`.
pub fn restore_checkpoint<P: AsRef<Path>>(
    network: &mut dyn Network,
    path: P,
) -> Result<NetworkCheckpoint, SerializationError> {
    let checkpoint = load_checkpoint(path)?;
    let expected = network.parameters_count();
    if checkpoint.parameters.len() != expected {
        return Err(SerializationError::ParameterCountMismatch {
            expected,
            got: checkpoint.parameters.len(),
        });
    }
    network.set_parameters(&Vector::from(checkpoint.parameters.clone()))?;
    Ok(checkpoint)
}

// --- JSON Documents ---

pub fn to_json<T: Serialize>(value: &T) -> Result<String, SerializationError> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, SerializationError> {
    Ok(serde_json::from_str(text)?)
}

pub fn save_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<(), SerializationError> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, SerializationError> {
    let file = File::open(path.as_ref())?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Activation, NeuralNetwork};

    #[test]
    fn checkpoint_roundtrip_restores_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.bin");

        let source = NeuralNetwork::new(&[2, 3, 1], Activation::HyperbolicTangent, Activation::Linear, Some(7)).unwrap();
        save_checkpoint(&source, 12, &path).unwrap();
        assert!(!temporary_path(&path).exists());

        let mut target = NeuralNetwork::new(&[2, 3, 1], Activation::HyperbolicTangent, Activation::Linear, Some(8)).unwrap();
        let checkpoint = restore_checkpoint(&mut target, &path).unwrap();
        assert_eq!(checkpoint.epoch, 12);
        assert_eq!(target.parameters(), source.parameters());
    }

    #[test]
    fn checkpoint_for_other_architecture_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("network.bin");

        let source = NeuralNetwork::new(&[2, 1], Activation::Linear, Activation::Linear, Some(1)).unwrap();
        save_checkpoint(&source, 0, &path).unwrap();

        let mut target = NeuralNetwork::new(&[3, 1], Activation::Linear, Activation::Linear, Some(1)).unwrap();
        assert!(matches!(
            restore_checkpoint(&mut target, &path),
            Err(SerializationError::ParameterCountMismatch { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn failed_rename_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory at the target path makes the rename fail.
        let path = dir.path().join("occupied");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("keep"), b"x").unwrap();

        let network = NeuralNetwork::new(&[2, 1], Activation::Linear, Activation::Linear, Some(1)).unwrap();
        assert!(save_checkpoint(&network, 3, &path).is_err());
        assert!(!temporary_path(&path).exists());
        assert!(path.join("keep").exists());
    }
}
