#![allow(dead_code)]

use tempfile::TempDir;
use voter_ingest::{BatchKey, Field, IngestConfig, Ingestor, VoterStore, FIELD_COUNT};

/// One extract row with sensible defaults; override columns as needed.
pub fn line(id: &str, overrides: &[(Field, &str)]) -> String {
    let mut cols = vec![String::new(); FIELD_COUNT];
    cols[Field::VoterId.position()] = id.to_string();
    cols[Field::LastName.position()] = "SMITH".into();
    cols[Field::FirstName.position()] = "JANE".into();
    cols[Field::HouseNumber.position()] = "12".into();
    cols[Field::StreetName.position()] = "MAIN ST".into();
    cols[Field::City.position()] = "ROCHESTER".into();
    cols[Field::Zip.position()] = "14604".into();
    cols[Field::ElectionDistrict.position()] = "7".into();
    cols[Field::Party.position()] = "DEM".into();
    cols[Field::DateOfBirth.position()] = "03/15/1985".into();
    cols[Field::RegistrationDate.position()] = "\"10/01/2004\"".into();
    cols[Field::Status.position()] = "A".into();
    for (field, value) in overrides {
        cols[field.position()] = value.to_string();
    }
    cols.join(",")
}

pub fn extract(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

pub async fn open_store(dir: &TempDir) -> anyhow::Result<VoterStore> {
    let store = VoterStore::open(&dir.path().join("voters.db")).await?;
    store.init_schema().await?;
    Ok(store)
}

pub fn ingestor(store: &VoterStore, batch_size: usize) -> anyhow::Result<Ingestor> {
    let config = IngestConfig {
        batch_size,
        ..Default::default()
    };
    Ok(Ingestor::new(store.clone(), &config)?)
}

pub const B1: BatchKey = BatchKey::new(2024, 1);
pub const B2: BatchKey = BatchKey::new(2024, 2);
