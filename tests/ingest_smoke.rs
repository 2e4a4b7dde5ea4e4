mod common;

use async_compression::tokio::write::GzipEncoder;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use voter_ingest::{BatchKey, Field, IngestConfig, Ingestor};

use common::{line, open_store};

#[tokio::test]
async fn ingests_gzip_extract_in_bounded_flushes() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let cities = ["ROCHESTER", "BRIGHTON", "GREECE"];
    let mut text = String::new();
    for i in 0..20_000 {
        let id = format!("NY{i:010}");
        let house = (i % 300 + 1).to_string();
        text.push_str(&line(
            &id,
            &[(Field::City, cities[i % 3]), (Field::HouseNumber, &house)],
        ));
        text.push('\n');
    }

    let gz_path = dir.path().join("extract.txt.gz");
    let mut encoder = GzipEncoder::new(tokio::fs::File::create(&gz_path).await?);
    encoder.write_all(text.as_bytes()).await?;
    encoder.shutdown().await?;

    let store = open_store(&dir).await?;
    let config = IngestConfig {
        batch_size: 3_000,
        ..Default::default()
    };
    let ingestor = Ingestor::new(store.clone(), &config)?;
    let batch = BatchKey::new(2024, 7);
    let stats = ingestor
        .run_path(&gz_path, batch, &CancellationToken::new())
        .await?;

    assert_eq!(stats.rows_processed, 20_000);
    assert_eq!(stats.rows_created, 20_000);
    assert_eq!(stats.rows_updated, 0);
    assert_eq!(stats.flushes, 7);
    assert!(stats.categories_updated);
    assert_eq!(store.archive_count(batch).await?, 20_000);
    assert_eq!(store.latest_count().await?, 20_000);

    let voter = store.latest("NY0000019999").await?.expect("last row stored");
    assert_eq!(voter.batch, batch);
    assert_eq!(voter.fields.integer(Field::HouseNumber), Some(19_999 % 300 + 1));
    assert_eq!(voter.fields.text(Field::City), Some(cities[19_999 % 3]));

    let categories = store.category_snapshot().await?.expect("snapshot saved");
    assert_eq!(categories.get(Field::City), ["BRIGHTON", "GREECE", "ROCHESTER"]);
    Ok(())
}

#[tokio::test]
async fn transcodes_windows_1252_extract() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("county.txt");
    let row = line("NY1", &[(Field::LastName, "M\u{DC}LLER"), (Field::City, "PE\u{D1}A")]);
    // encode to windows-1252 by hand: both characters are single bytes there
    let bytes: Vec<u8> = row
        .chars()
        .map(|c| u8::try_from(u32::from(c)).expect("latin-1 range"))
        .chain(std::iter::once(b'\n'))
        .collect();
    tokio::fs::write(&path, &bytes).await?;

    let store = open_store(&dir).await?;
    let config = IngestConfig {
        charset: "windows-1252".to_string(),
        ..Default::default()
    };
    let ingestor = Ingestor::new(store.clone(), &config)?;
    ingestor
        .run_path(&path, BatchKey::new(2024, 1), &CancellationToken::new())
        .await?;

    let voter = store.latest("NY1").await?.expect("row stored");
    assert_eq!(voter.fields.text(Field::LastName), Some("MÜLLER"));
    assert_eq!(
        store.category_snapshot().await?.expect("snapshot").get(Field::City),
        ["PEÑA"]
    );
    Ok(())
}

#[tokio::test]
async fn honours_configured_delimiter() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = open_store(&dir).await?;
    let config = IngestConfig {
        delimiter: '|',
        ..Default::default()
    };
    let ingestor = Ingestor::new(store.clone(), &config)?;
    let text = format!("{}\n", line("NY1", &[(Field::LastName, "O,BRIEN")]).replace(',', "|"));
    // the comma inside the name survives because '|' separates columns
    let text = text.replace("O|BRIEN", "O,BRIEN");
    ingestor
        .run(text.as_bytes(), BatchKey::new(2024, 1), &CancellationToken::new())
        .await?;

    let voter = store.latest("NY1").await?.expect("row stored");
    assert_eq!(voter.fields.text(Field::LastName), Some("O,BRIEN"));
    assert_eq!(voter.fields.integer(Field::ElectionDistrict), Some(7));
    Ok(())
}
