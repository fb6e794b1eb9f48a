use api_lib::adapters::SqliteVectorIndex;
use flight_assistant_core::domain::{DocumentMetadata, IndexedDocument, MetadataFilter};
use flight_assistant_core::ports::VectorIndex;

fn document(flight_id: i64, departure_port: &str) -> IndexedDocument {
    IndexedDocument {
        content: format!("Flight {flight_id} departs {departure_port}"),
        metadata: DocumentMetadata {
            flight_id,
            departure_port: Some(departure_port.to_string()),
        },
    }
}

async fn open_index(dir: &tempfile::TempDir) -> SqliteVectorIndex {
    SqliteVectorIndex::load(&dir.path().join("nested").join("index.db"))
        .await
        .unwrap()
}

#[tokio::test]
async fn build_replaces_contents_and_records_build_time() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(&dir).await;
    assert!(index.built_at().await.unwrap().is_none());

    index
        .build(vec![
            (document(1, "CNS"), vec![1.0, 0.0]),
            (document(2, "AKL"), vec![0.0, 1.0]),
        ])
        .await
        .unwrap();
    assert_eq!(index.len().await.unwrap(), 2);
    assert!(index.built_at().await.unwrap().is_some());

    index
        .build(vec![(document(3, "SYD"), vec![1.0, 1.0])])
        .await
        .unwrap();
    assert_eq!(index.len().await.unwrap(), 1);
}

#[tokio::test]
async fn search_ranks_by_cosine_and_honours_the_filter() {
    let dir = tempfile::tempdir().unwrap();
    let index = open_index(&dir).await;
    index
        .build(vec![
            (document(1, "CNS"), vec![1.0, 0.0]),
            (document(2, "AKL"), vec![0.6, 0.8]),
            (document(3, "AKL"), vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

    let all = index.similarity_search(&[1.0, 0.0], 2, None).await.unwrap();
    let ids: Vec<i64> = all.iter().map(|d| d.document.metadata.flight_id).collect();
    assert_eq!(ids, vec![1, 2]);

    let filter = MetadataFilter::DeparturePort("AKL".to_string());
    let filtered = index
        .similarity_search(&[1.0, 0.0], 5, Some(&filter))
        .await
        .unwrap();
    let ids: Vec<i64> = filtered.iter().map(|d| d.document.metadata.flight_id).collect();
    assert_eq!(ids, vec![2, 3]);
    assert_eq!(filtered[0].document.content, "Flight 2 departs AKL");
}

#[tokio::test]
async fn index_persists_across_reloads_until_cleared() {
    let dir = tempfile::tempdir().unwrap();
    {
        let index = open_index(&dir).await;
        index
            .build(vec![(document(1, "CNS"), vec![1.0])])
            .await
            .unwrap();
    }

    let reopened = open_index(&dir).await;
    assert_eq!(reopened.len().await.unwrap(), 1);

    reopened.clear().await.unwrap();
    assert_eq!(reopened.len().await.unwrap(), 0);
    assert!(reopened.built_at().await.unwrap().is_none());
}
