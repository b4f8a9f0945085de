//! LanceDB-backed chunk store for indexed manuals.
//!
//! One table, one row per chunk, equipment labels as first-class columns so
//! retrieval can filter with SQL equality predicates. Similarity scores are
//! derived from cosine distance as `1 - distance`, clamped non-negative.

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array,
};
use arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;

use crate::types::{ChunkRecord, EquipmentFilter, PassageMetadata, RetrievedPassage};

const TABLE_NAME: &str = "manual_chunks";

/// Value stored for labels the registry could not supply. Mapped back to
/// `None` when rows are read out.
const UNKNOWN: &str = "unknown";

pub struct ManualStore {
    db: lancedb::Connection,
    dimension: usize,
}

/// One distinct manual in the store, with its chunk count.
#[derive(Debug, Clone)]
pub struct ManualInventoryEntry {
    pub title: String,
    pub equipment_type: String,
    pub equipment_brand: String,
    pub chunks: usize,
}

impl ManualStore {
    pub async fn new(path: &str, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(path).ok();
        let db = lancedb::connect(path)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let store = Self { db, dimension };
        store.ensure_table().await?;
        Ok(store)
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("equipment_type", DataType::Utf8, false),
            Field::new("equipment_brand", DataType::Utf8, false),
            Field::new("equipment_model", DataType::Utf8, false),
            Field::new("manual_type", DataType::Utf8, false),
            Field::new("page_number", DataType::UInt32, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                true,
            ),
            Field::new("created_at", DataType::Int64, false),
        ]))
    }

    async fn ensure_table(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.contains(&TABLE_NAME.to_string()) {
            return Ok(());
        }

        // LanceDB wants at least one batch to infer storage layout; create
        // with a seed row, then delete it.
        let schema = self.schema();
        let seed_vec = vec![0.0f32; self.dimension];
        let values = Float32Array::from(seed_vec);
        let vector_array = FixedSizeListArray::new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec!["__seed__"])) as Arc<dyn Array>,
                Arc::new(StringArray::from(vec![""])),
                Arc::new(StringArray::from(vec![""])),
                Arc::new(StringArray::from(vec![UNKNOWN])),
                Arc::new(StringArray::from(vec![UNKNOWN])),
                Arc::new(StringArray::from(vec![UNKNOWN])),
                Arc::new(StringArray::from(vec![""])),
                Arc::new(UInt32Array::from(vec![0u32])),
                Arc::new(UInt32Array::from(vec![0u32])),
                Arc::new(StringArray::from(vec![""])),
                Arc::new(vector_array) as Arc<dyn Array>,
                Arc::new(Int64Array::from(vec![0i64])),
            ],
        )
        .context("Failed to create seed RecordBatch")?;

        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.db
            .create_table(TABLE_NAME, Box::new(batches))
            .execute()
            .await
            .context("Failed to create manual_chunks table")?;

        let table = self.db.open_table(TABLE_NAME).execute().await?;
        table.delete("id = '__seed__'").await.ok();
        Ok(())
    }

    pub async fn upsert_chunks(&self, chunks: Vec<ChunkRecord>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open manual_chunks table")?;

        let len = chunks.len();
        let schema = self.schema();

        let ids: Vec<&str> = chunks.iter().map(|c| c.id.as_str()).collect();
        let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        let titles: Vec<&str> = chunks.iter().map(|c| c.title.as_str()).collect();
        let types: Vec<&str> = chunks.iter().map(|c| c.equipment_type.as_str()).collect();
        let brands: Vec<&str> = chunks.iter().map(|c| c.equipment_brand.as_str()).collect();
        let models: Vec<&str> = chunks.iter().map(|c| c.equipment_model.as_str()).collect();
        let manual_types: Vec<&str> = chunks.iter().map(|c| c.manual_type.as_str()).collect();
        let pages: Vec<u32> = chunks.iter().map(|c| c.page_number).collect();
        let chunk_indices: Vec<u32> = chunks.iter().map(|c| c.chunk_index).collect();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let created_ats: Vec<i64> = chunks.iter().map(|c| c.created_at).collect();

        let flat_vectors: Vec<f32> = chunks
            .iter()
            .flat_map(|c| c.vector.iter().copied())
            .collect();
        let values = Float32Array::from(flat_vectors);
        let vector_array = FixedSizeListArray::new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            self.dimension as i32,
            Arc::new(values) as Arc<dyn Array>,
            None,
        );

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(ids)) as Arc<dyn Array>,
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(titles)),
                Arc::new(StringArray::from(types)),
                Arc::new(StringArray::from(brands)),
                Arc::new(StringArray::from(models)),
                Arc::new(StringArray::from(manual_types)),
                Arc::new(UInt32Array::from(pages)),
                Arc::new(UInt32Array::from(chunk_indices)),
                Arc::new(StringArray::from(texts)),
                Arc::new(vector_array) as Arc<dyn Array>,
                Arc::new(Int64Array::from(created_ats)),
            ],
        )
        .context("Failed to create RecordBatch")?;

        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema);
        table
            .add(Box::new(reader))
            .execute()
            .await
            .context("Failed to insert chunks")?;

        tracing::debug!("Inserted {} chunks into LanceDB", len);
        Ok(())
    }

    /// Cosine nearest-neighbor search, optionally constrained by equipment
    /// equality predicates.
    pub async fn vector_search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&EquipmentFilter>,
    ) -> Result<Vec<RetrievedPassage>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;

        let mut query_builder = table
            .query()
            .nearest_to(query)?
            .distance_type(lancedb::DistanceType::Cosine)
            .limit(k);

        if let Some(predicate) = filter.and_then(filter_predicate) {
            tracing::debug!(predicate = %predicate, "filtered vector search");
            query_builder = query_builder.only_if(predicate);
        }

        let results = query_builder
            .execute()
            .await
            .context("LanceDB vector search failed")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        Ok(extract_passages_from_batches(&batches))
    }

    /// Remove every chunk indexed from the given source file. Makes
    /// re-indexing idempotent: the same manual always produces a clean
    /// replacement rather than accumulating stale copies.
    pub async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let count_before = table.count_rows(None).await.unwrap_or(0);
        let predicate = format!("source = '{}'", source.replace('\'', "''"));
        table.delete(&predicate).await?;
        let count_after = table.count_rows(None).await.unwrap_or(0);
        Ok(count_before - count_after)
    }

    pub async fn clear(&self) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.contains(&TABLE_NAME.to_string()) {
            self.db.drop_table(TABLE_NAME, &[]).await?;
        }
        self.ensure_table().await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        Ok(table.count_rows(None).await?)
    }

    /// Distinct manuals in the store with their chunk counts.
    pub async fn inventory(&self) -> Result<Vec<ManualInventoryEntry>> {
        let table = self.db.open_table(TABLE_NAME).execute().await?;
        let results = table
            .query()
            .select(lancedb::query::Select::columns(&[
                "title",
                "equipment_type",
                "equipment_brand",
            ]))
            .execute()
            .await
            .context("Failed to query manual inventory")?;

        let batches: Vec<RecordBatch> = futures::TryStreamExt::try_collect(results).await?;
        let mut entries: Vec<ManualInventoryEntry> = Vec::new();

        for batch in &batches {
            let titles = string_column(batch, "title");
            let types = string_column(batch, "equipment_type");
            let brands = string_column(batch, "equipment_brand");

            let (Some(titles), Some(types), Some(brands)) = (titles, types, brands) else {
                continue;
            };

            for i in 0..batch.num_rows() {
                let title = titles.value(i);
                if title.is_empty() {
                    continue;
                }
                match entries.iter_mut().find(|e| e.title == title) {
                    Some(entry) => entry.chunks += 1,
                    None => entries.push(ManualInventoryEntry {
                        title: title.to_string(),
                        equipment_type: types.value(i).to_string(),
                        equipment_brand: brands.value(i).to_string(),
                        chunks: 1,
                    }),
                }
            }
        }

        entries.sort_by(|a, b| a.title.cmp(&b.title));
        Ok(entries)
    }
}

/// SQL equality predicate for an equipment filter; `None` when the filter
/// has no constraints.
fn filter_predicate(filter: &EquipmentFilter) -> Option<String> {
    let mut predicates = Vec::new();

    if let Some(ref brand) = filter.brand {
        predicates.push(format!(
            "equipment_brand = '{}'",
            brand.replace('\'', "''")
        ));
    }
    if let Some(ref equipment_type) = filter.equipment_type {
        predicates.push(format!(
            "equipment_type = '{}'",
            equipment_type.replace('\'', "''")
        ));
    }

    if predicates.is_empty() {
        None
    } else {
        Some(predicates.join(" AND "))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
}

/// Map Arrow rows back to passages. The stored `"unknown"` / empty label
/// sentinels become `None` so downstream code never string-matches them.
fn extract_passages_from_batches(batches: &[RecordBatch]) -> Vec<RetrievedPassage> {
    let mut passages = Vec::new();

    for batch in batches {
        let texts = string_column(batch, "text");
        let titles = string_column(batch, "title");
        let sources = string_column(batch, "source");
        let types = string_column(batch, "equipment_type");
        let brands = string_column(batch, "equipment_brand");
        let pages = batch
            .column_by_name("page_number")
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
        let chunk_indices = batch
            .column_by_name("chunk_index")
            .and_then(|c| c.as_any().downcast_ref::<UInt32Array>());
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

        let Some(texts) = texts else { continue };

        for i in 0..batch.num_rows() {
            let score = distances
                .map(|d| (1.0 - d.value(i)).max(0.0))
                .unwrap_or(0.0);

            passages.push(RetrievedPassage {
                content: texts.value(i).to_string(),
                score,
                metadata: PassageMetadata {
                    equipment_type: types.and_then(|c| optional_label(c.value(i))),
                    equipment_brand: brands.and_then(|c| optional_label(c.value(i))),
                    title: titles.and_then(|c| optional_label(c.value(i))),
                    source: sources
                        .map(|c| c.value(i).to_string())
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                    page_number: pages.map(|c| c.value(i)).filter(|&p| p > 0),
                    chunk_index: chunk_indices.map(|c| c.value(i)).unwrap_or(0),
                },
            });
        }
    }

    passages
}

fn optional_label(value: &str) -> Option<String> {
    if value.is_empty() || value == UNKNOWN {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_predicate_escapes_and_joins() {
        let filter = EquipmentFilter {
            brand: Some("O'Brien".to_string()),
            equipment_type: Some("Fryer".to_string()),
        };
        assert_eq!(
            filter_predicate(&filter).unwrap(),
            "equipment_brand = 'O''Brien' AND equipment_type = 'Fryer'"
        );
    }

    #[test]
    fn empty_filter_has_no_predicate() {
        assert!(filter_predicate(&EquipmentFilter::default()).is_none());
    }

    #[test]
    fn unknown_labels_read_back_as_none() {
        assert_eq!(optional_label("unknown"), None);
        assert_eq!(optional_label(""), None);
        assert_eq!(optional_label("Metos"), Some("Metos".to_string()));
    }
}
