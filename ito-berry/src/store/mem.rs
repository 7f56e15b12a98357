use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{insert_score, ResultStore, StoreError, StoreResult, TransformedData};
use crate::data::IdTag;
use crate::metric::Score;

/// 内存存储, 用于测试与合成数据.
#[derive(Debug, Default)]
pub struct MemStore {
    records: Mutex<HashMap<IdTag, TransformedData>>,
}

impl MemStore {
    /// 空存储.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录条数.
    pub fn len(&self) -> usize {
        self.records().len()
    }

    /// 是否为空.
    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<IdTag, TransformedData>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResultStore for MemStore {
    fn save(&self, data: &TransformedData, overwrite: bool) -> StoreResult<()> {
        let mut records = self.records();
        let tag = &data.template_id_tag;
        if !overwrite && records.contains_key(tag) {
            return Err(StoreError::AlreadyExists(tag.clone()));
        }
        records.insert(tag.clone(), data.clone());
        Ok(())
    }

    fn load(&self, template: &IdTag) -> StoreResult<TransformedData> {
        self.records()
            .get(template)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(template.clone()))
    }

    fn list(&self) -> StoreResult<Vec<IdTag>> {
        let mut tags: Vec<IdTag> = self.records().keys().cloned().collect();
        tags.sort();
        Ok(tags)
    }

    fn append_score(
        &self,
        template: &IdTag,
        name: &str,
        score: &Score,
        overwrite: bool,
    ) -> StoreResult<()> {
        let mut records = self.records();
        let rec = records
            .get_mut(template)
            .ok_or_else(|| StoreError::NotFound(template.clone()))?;
        insert_score(&mut rec.scores, template, name, score, overwrite)
    }

    fn clear_scores(&self, template: &IdTag) -> StoreResult<()> {
        let mut records = self.records();
        let rec = records
            .get_mut(template)
            .ok_or_else(|| StoreError::NotFound(template.clone()))?;
        rec.scores.clear();
        Ok(())
    }

    #[inline]
    fn contains(&self, template: &IdTag) -> bool {
        self.records().contains_key(template)
    }
}
