use ndarray::{Array2, ArrayD};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{ResultSink, SinkError};
use crate::core::models::histogram::{PadfMode, Theta};
use crate::engine::state::{ConvergenceRecord, SimilarityEntry};

/// Writes artifacts as `.npy` and `.csv` files named after the run.
///
/// | Artifact              | File name                                  |
/// |-----------------------|--------------------------------------------|
/// | worker partial        | `<name>_theta_<loop>_<slot>.npy`           |
/// | loop histogram        | `<name>_theta_loop_<loop>.npy`             |
/// | total (slice / full)  | `<name>_slice_total_sum.npy` / `<name>_theta_total_sum.npy` |
/// | convergence record    | `<name>_convergence.csv`                   |
/// | corrected histogram   | `<name>_slice_corrected.csv`               |
#[derive(Debug, Clone)]
pub struct NpyDirectorySink {
    directory: PathBuf,
    name: String,
    intermediates: Vec<PathBuf>,
}

impl NpyDirectorySink {
    /// Opens (and creates if needed) the output directory for run `name`.
    pub fn new(directory: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self, SinkError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            name: name.into(),
            intermediates: Vec::new(),
        })
    }

    /// Opens the directory of an existing run for reading, without creating anything.
    ///
    /// Returns [`SinkError::Missing`] if `directory` does not exist.
    pub fn open(directory: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self, SinkError> {
        let directory = directory.into();
        if !directory.is_dir() {
            return Err(SinkError::Missing(directory.display().to_string()));
        }
        Ok(Self {
            directory,
            name: name.into(),
            intermediates: Vec::new(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partial_path(&self, loop_index: usize, slot: usize) -> PathBuf {
        self.artifact(&format!("theta_{}_{}.npy", loop_index, slot))
    }

    pub fn loop_path(&self, loop_index: usize) -> PathBuf {
        self.artifact(&format!("theta_loop_{}.npy", loop_index))
    }

    pub fn total_path(&self, mode: PadfMode) -> PathBuf {
        match mode {
            PadfMode::Slice => self.artifact("slice_total_sum.npy"),
            PadfMode::Full => self.artifact("theta_total_sum.npy"),
        }
    }

    pub fn convergence_path(&self) -> PathBuf {
        self.artifact("convergence.csv")
    }

    pub fn corrected_path(&self) -> PathBuf {
        self.artifact("slice_corrected.csv")
    }

    /// Loads the total histogram of a finished run.
    pub fn load_total(&self, mode: PadfMode) -> Result<Theta, SinkError> {
        read_theta(&self.total_path(mode), mode)
    }

    /// Loads the convergence record of a finished run.
    pub fn load_convergence(&self) -> Result<ConvergenceRecord, SinkError> {
        let path = self.convergence_path();
        if !path.exists() {
            return Err(SinkError::Missing(path.display().to_string()));
        }
        let mut reader = csv::Reader::from_path(&path)?;
        let record = reader
            .deserialize::<SimilarityEntry>()
            .collect::<Result<ConvergenceRecord, _>>()?;
        Ok(record)
    }

    fn artifact(&self, suffix: &str) -> PathBuf {
        self.directory.join(format!("{}_{}", self.name, suffix))
    }
}

fn write_theta(path: &Path, histogram: &Theta) -> Result<(), SinkError> {
    let writer = BufWriter::new(File::create(path)?);
    histogram
        .view_dyn()
        .write_npy(writer)
        .map_err(|e| SinkError::Write {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
    debug!(path = %path.display(), "Wrote histogram");
    Ok(())
}

fn read_theta(path: &Path, mode: PadfMode) -> Result<Theta, SinkError> {
    if !path.exists() {
        return Err(SinkError::Missing(path.display().to_string()));
    }
    let corrupt = |message: String| SinkError::Corrupt {
        artifact: path.display().to_string(),
        message,
    };
    let reader = BufReader::new(File::open(path)?);
    let data = ArrayD::<f64>::read_npy(reader).map_err(|e| corrupt(e.to_string()))?;
    Theta::from_dyn(mode, data).map_err(|e| corrupt(e.to_string()))
}

impl ResultSink for NpyDirectorySink {
    fn store_partial(
        &mut self,
        loop_index: usize,
        slot: usize,
        histogram: &Theta,
    ) -> Result<(), SinkError> {
        let path = self.partial_path(loop_index, slot);
        write_theta(&path, histogram)?;
        self.intermediates.push(path);
        Ok(())
    }

    fn store_loop(&mut self, loop_index: usize, histogram: &Theta) -> Result<(), SinkError> {
        let path = self.loop_path(loop_index);
        write_theta(&path, histogram)?;
        self.intermediates.push(path);
        Ok(())
    }

    fn load_loop(&self, loop_index: usize, mode: PadfMode) -> Result<Theta, SinkError> {
        read_theta(&self.loop_path(loop_index), mode)
    }

    fn store_total(&mut self, total: &Theta, corrected: &Array2<f64>) -> Result<(), SinkError> {
        let total_path = self.total_path(total.mode());
        write_theta(&total_path, total)?;

        let corrected_path = self.corrected_path();
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&corrected_path)?;
        for row in corrected.rows() {
            writer.write_record(row.iter().map(|value| value.to_string()))?;
        }
        writer.flush()?;
        info!(
            total = %total_path.display(),
            corrected = %corrected_path.display(),
            "Saved final histograms"
        );
        Ok(())
    }

    fn store_convergence(&mut self, record: &ConvergenceRecord) -> Result<(), SinkError> {
        let path = self.convergence_path();
        let mut writer = csv::Writer::from_path(&path)?;
        for entry in record.entries() {
            writer.serialize(entry)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn clear_intermediates(&mut self) -> Result<(), SinkError> {
        let count = self.intermediates.len();
        for path in self.intermediates.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(count, "Removed intermediate artifacts");
        Ok(())
    }
}
