//! Session files and per-task groups.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use gaze_core::GazeResult;
use hdf5::types::VarLenUnicode;
use tracing::info;

use crate::h5_error;

/// Protocol metadata stamped onto the session file root.
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    pub protocol_name: String,
    pub participant_id: String,
    pub notes: String,
}

/// One HDF5 file for one protocol run, named by the run UUID.
pub struct SessionFile {
    file: hdf5::File,
    path: PathBuf,
}

impl SessionFile {
    /// Create `<data_dir>/<run_uuid>.h5`, truncating any stale file of the
    /// same name, and stamp the protocol metadata.
    pub fn create(data_dir: &Path, run_uuid: &str, meta: &SessionMetadata) -> GazeResult<Self> {
        let path = data_dir.join(format!("{run_uuid}.h5"));
        let file = hdf5::File::create(&path).map_err(h5_error)?;

        write_string_attr(&file, "protocol_name", &meta.protocol_name)?;
        write_string_attr(&file, "participant_id", &meta.participant_id)?;
        write_string_attr(&file, "notes", &meta.notes)?;
        write_string_attr(&file, "created", &Utc::now().to_rfc3339())?;

        info!("Created session file {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the group for task `index`, named `task_{index:03}`.
    pub fn create_task_group(&self, index: usize) -> GazeResult<TaskGroup> {
        let name = format!("task_{index:03}");
        let group = self.file.create_group(&name).map_err(h5_error)?;
        Ok(TaskGroup { group, name })
    }
}

/// One group per task inside the session file.
pub struct TaskGroup {
    pub(crate) group: hdf5::Group,
    name: String,
}

impl TaskGroup {
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn write_string_attr(file: &hdf5::File, name: &str, value: &str) -> GazeResult<()> {
    let value = VarLenUnicode::from_str(value)
        .map_err(|err| gaze_core::GazeError::BadFormat(err.to_string()))?;
    file.new_attr::<VarLenUnicode>()
        .create(name)
        .map_err(h5_error)?
        .write_scalar(&value)
        .map_err(h5_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_file_carries_metadata_and_groups() {
        let dir = tempfile::tempdir().unwrap();
        let meta = SessionMetadata {
            protocol_name: "demo".into(),
            participant_id: "p01".into(),
            notes: "dry run".into(),
        };
        let session = SessionFile::create(dir.path(), "0000-test", &meta).unwrap();
        assert!(session.path().ends_with("0000-test.h5"));

        let group = session.create_task_group(0).unwrap();
        assert_eq!(group.name(), "task_000");
        let group = session.create_task_group(12).unwrap();
        assert_eq!(group.name(), "task_012");
        drop(session);

        let file = hdf5::File::open(dir.path().join("0000-test.h5")).unwrap();
        assert!(file.group("task_000").is_ok());
        assert!(file.group("task_012").is_ok());
        let name: VarLenUnicode = file.attr("protocol_name").unwrap().read_scalar().unwrap();
        assert_eq!(name.as_str(), "demo");
    }
}
