use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

pub fn save_json<T: Serialize>(data: &T, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(serde_json::to_string_pretty(data)?.as_bytes())?;
    file.write_all(b"\n")?;
    info!(path = %path.display(), "wrote job status");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::{JobStatus, Summary};

    #[test]
    fn writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        save_json(&JobStatus::completed(Summary::new(3, vec![])), &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let parsed: JobStatus = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, JobStatus::completed(Summary::new(3, vec![])));
        assert!(written.contains("\"totalRecords\": 3"));
    }
}
