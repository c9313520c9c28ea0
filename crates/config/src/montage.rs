//! Montage and bipolar-pair CSV loading (spec §6 "Montage CSV"/"Bipolar CSV").

use std::collections::HashMap;

use elemem_types::{BipolarPair, ElememError};

#[derive(Debug, Clone, PartialEq)]
pub struct MontageEntry {
    pub label: String,
    pub channel_number: u8,
    pub area_mm2: f32,
}

/// Loads a montage CSV: `(label, channel_number, area_mm2)`, channel_number
/// in [0,255]. Malformed rows are a fatal-to-start `FileFormat` error.
pub fn load_montage(path: &str) -> Result<Vec<MontageEntry>, ElememError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| ElememError::file_format(format!("cannot open montage csv {path}: {e}")))?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ElememError::file_format(format!("malformed montage row in {path}: {e}")))?;
        if record.len() < 3 {
            return Err(ElememError::file_format(format!(
                "montage row in {path} has {} columns, need >=3",
                record.len()
            )));
        }
        let label = record[0].trim().to_string();
        let channel_number: u16 = record[1]
            .trim()
            .parse()
            .map_err(|e| ElememError::file_format(format!("bad channel_number in {path}: {e}")))?;
        if channel_number > u8::MAX as u16 {
            return Err(ElememError::file_format(format!(
                "channel_number {channel_number} in {path} out of [0,255]"
            )));
        }
        let area_mm2: f32 = record[2]
            .trim()
            .parse()
            .map_err(|e| ElememError::file_format(format!("bad area_mm2 in {path}: {e}")))?;
        entries.push(MontageEntry {
            label,
            channel_number: channel_number as u8,
            area_mm2,
        });
    }
    Ok(entries)
}

/// Builds the `label -> channel_number` and `channel_number -> area_mm2`
/// lookups stim-channel resolution needs from a loaded montage.
pub fn label_and_area_maps(montage: &[MontageEntry]) -> (HashMap<String, u8>, HashMap<u8, f32>) {
    let mut label_to_channel = HashMap::new();
    let mut channel_area = HashMap::new();
    for entry in montage {
        label_to_channel.insert(entry.label.clone(), entry.channel_number);
        channel_area.insert(entry.channel_number, entry.area_mm2);
    }
    (label_to_channel, channel_area)
}

/// Loads a bipolar-pair CSV: `(label, pos, neg)`. Per design, this load is
/// non-validating: it does not check `pos`/`neg` against the montage here,
/// only that they parse as electrode indices accepted by [`BipolarPair`].
pub fn load_bipolar_pairs(path: &str) -> Result<Vec<(String, BipolarPair)>, ElememError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| ElememError::file_format(format!("cannot open bipolar csv {path}: {e}")))?;

    let mut pairs = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ElememError::file_format(format!("malformed bipolar row in {path}: {e}")))?;
        if record.len() < 3 {
            return Err(ElememError::file_format(format!(
                "bipolar row in {path} has {} columns, need >=3",
                record.len()
            )));
        }
        let label = record[0].trim().to_string();
        let pos: u8 = record[1]
            .trim()
            .parse()
            .map_err(|e| ElememError::file_format(format!("bad pos electrode in {path}: {e}")))?;
        let neg: u8 = record[2]
            .trim()
            .parse()
            .map_err(|e| ElememError::file_format(format!("bad neg electrode in {path}: {e}")))?;
        let pair = BipolarPair::new(pos, neg).map_err(|e| ElememError::file_format(format!("{path}: {e}")))?;
        pairs.push((label, pair));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_montage_rows() {
        let mut file = tempfile_with("LA1,0,0.5\nLA2,1,0.5\n");
        let entries = load_montage(file.path_str()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label, "LA1");
        assert_eq!(entries[0].channel_number, 0);

        file.close();
    }

    #[test]
    fn rejects_short_montage_row() {
        let mut file = tempfile_with("LA1,0\n");
        let err = load_montage(file.path_str()).unwrap_err();
        assert!(matches!(err, ElememError::FileFormat(_)));
        file.close();
    }

    #[test]
    fn builds_label_and_area_maps_from_montage() {
        let entries = vec![
            MontageEntry { label: "LA1".to_string(), channel_number: 0, area_mm2: 0.5 },
            MontageEntry { label: "LA2".to_string(), channel_number: 1, area_mm2: 0.25 },
        ];
        let (label_to_channel, channel_area) = label_and_area_maps(&entries);
        assert_eq!(label_to_channel.get("LA1"), Some(&0));
        assert_eq!(label_to_channel.get("LA2"), Some(&1));
        assert_eq!(channel_area.get(&0), Some(&0.5));
        assert_eq!(channel_area.get(&1), Some(&0.25));
    }

    #[test]
    fn loads_bipolar_rows_without_cross_checking_montage() {
        let mut file = tempfile_with("LA1-LA2,0,1\n");
        let pairs = load_bipolar_pairs(file.path_str()).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].1.pos, 0);
        assert_eq!(pairs[0].1.neg, 1);
        file.close();
    }

    struct ScratchFile {
        path: std::path::PathBuf,
    }

    impl ScratchFile {
        fn path_str(&self) -> &str {
            self.path.to_str().unwrap()
        }
        fn close(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn tempfile_with(contents: &str) -> ScratchFile {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!("elemem_montage_test_{}_{n}.csv", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        ScratchFile { path }
    }
}
