use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::descriptor::Query;
use crate::distance::{DistanceConfig, DistanceMetric, WeightedDistance};
use crate::error::{Error, Result};
use crate::index::{FeatureIndex, ImageId};

/// 搜索结果中的一项，分数越小越相似
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: ImageId,
    pub score: f32,
}

impl Neighbor {
    fn cmp_key(&self, score: f32, id: &str) -> Ordering {
        self.score.total_cmp(&score).then_with(|| self.id.as_str().cmp(id))
    }
}

// 先按分数升序，分数相同时按 ID 升序，保证结果顺序唯一
impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key(other.score, &other.id)
    }
}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

/// 保留最小的 k 个结果，`k` 为 `None` 时保留全部
pub struct TopKNeighbors {
    heap: BinaryHeap<Neighbor>,
    k: Option<usize>,
}

impl TopKNeighbors {
    pub fn new(k: Option<usize>) -> Self {
        let capacity = k.map(|k| k + 1).unwrap_or(0);
        Self { heap: BinaryHeap::with_capacity(capacity), k }
    }

    pub fn push(&mut self, id: &str, score: f32) {
        if let Some(k) = self.k {
            if k == 0 {
                return;
            }
            if self.heap.len() >= k {
                // 堆顶是当前保留的最差结果
                match self.heap.peek() {
                    Some(worst) if worst.cmp_key(score, id) == Ordering::Greater => {
                        self.heap.pop();
                    }
                    _ => return,
                }
            }
        }
        self.heap.push(Neighbor { id: id.to_owned(), score });
    }

    pub fn merge(mut self, other: Self) -> Self {
        for n in other.heap {
            self.push(&n.id, n.score);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// 按相似度从高到低返回
    pub fn into_sorted_vec(self) -> Vec<Neighbor> {
        self.heap.into_sorted_vec()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// 返回的结果数量，`None` 表示返回全部
    pub top_k: Option<usize>,
    /// 排除的图片，通常是查询图片本身
    pub exclude: Option<ImageId>,
}

impl SearchParams {
    pub fn top_k(k: usize) -> Self {
        Self { top_k: Some(k), exclude: None }
    }
}

/// 候选集的获取方式
///
/// 实现必须返回按 `Neighbor` 的全序排列的结果，这样替换为近似索引后顺序约定不变
pub trait SearchBackend: Send + Sync {
    fn rank(
        &self,
        query: &[f32],
        index: &FeatureIndex,
        metric: &dyn DistanceMetric,
        params: &SearchParams,
    ) -> Result<Vec<Neighbor>>;
}

/// 穷举扫描所有索引项
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearScan;

impl SearchBackend for LinearScan {
    fn rank(
        &self,
        query: &[f32],
        index: &FeatureIndex,
        metric: &dyn DistanceMetric,
        params: &SearchParams,
    ) -> Result<Vec<Neighbor>> {
        let exclude = params.exclude.as_deref();
        let top = index
            .entries()
            .par_iter()
            .filter(|e| Some(e.id.as_str()) != exclude)
            .try_fold(
                || TopKNeighbors::new(params.top_k),
                |mut top, e| -> Result<_> {
                    top.push(&e.id, metric.distance(query, &e.vector)?);
                    Ok(top)
                },
            )
            .try_reduce(|| TopKNeighbors::new(params.top_k), |a, b| Ok(a.merge(b)))?;
        Ok(top.into_sorted_vec())
    }
}

/// 在索引中搜索与查询向量最相似的图片
pub struct Searcher<B: SearchBackend = LinearScan> {
    distance: DistanceConfig,
    backend: B,
}

impl Searcher<LinearScan> {
    pub fn new(distance: DistanceConfig) -> Self {
        Self { distance, backend: LinearScan }
    }
}

impl<B: SearchBackend> Searcher<B> {
    pub fn with_backend(distance: DistanceConfig, backend: B) -> Self {
        Self { distance, backend }
    }

    /// 返回按分数升序排列的结果，分数相同按 ID 升序
    ///
    /// # Arguments
    ///
    /// * `query` - 查询向量及其描述符配置
    /// * `index` - 特征索引
    /// * `params` - 结果数量与排除项
    pub fn search(
        &self,
        query: &Query,
        index: &FeatureIndex,
        params: &SearchParams,
    ) -> Result<Vec<Neighbor>> {
        index.check_query(query)?;
        if index.is_empty() {
            return Err(Error::EmptyIndex);
        }
        let metric = WeightedDistance::new(&self.distance, &index.config().layout())?;

        let start = Instant::now();
        let result = self.backend.rank(&query.vector, index, &metric, params)?;
        debug!(
            "ranked {} images in {:.2}ms, returning {}",
            index.len(),
            start.elapsed().as_secs_f64() * 1000.,
            result.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::descriptor::{DescriptorConfig, Quantization};
    use crate::index::Metadata;

    fn config() -> DescriptorConfig {
        DescriptorConfig::new(Quantization::hsv(2, 1, 1), 0.75)
    }

    fn vector(x: f32) -> Vec<f32> {
        [x, 1. - x].repeat(5)
    }

    fn build(items: &[(&str, f32)]) -> FeatureIndex {
        let mut index = FeatureIndex::new(config()).unwrap();
        for (id, x) in items {
            index.put(*id, vector(*x), Metadata::default()).unwrap();
        }
        index
    }

    fn query(x: f32) -> Query {
        Query { config: config(), vector: vector(x) }
    }

    fn ids(result: &[Neighbor]) -> Vec<&str> {
        result.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_rank_with_ties() {
        let index = build(&[("d", 0.9), ("c", 0.), ("a", 0.), ("b", 0.5)]);
        let searcher = Searcher::new(DistanceConfig::default());
        let result = searcher.search(&query(0.), &index, &SearchParams::default()).unwrap();
        assert_eq!(ids(&result), ["a", "c", "b", "d"]);
        assert_eq!(result[0].score, 0.);
        assert_eq!(result[1].score, 0.);
        assert!(result[2].score < result[3].score);
    }

    #[test]
    fn test_top_k() {
        let index = build(&[("d", 0.9), ("c", 0.), ("a", 0.), ("b", 0.5)]);
        let searcher = Searcher::new(DistanceConfig::default());
        let result = searcher.search(&query(0.), &index, &SearchParams::top_k(2)).unwrap();
        assert_eq!(ids(&result), ["a", "c"]);
        let result = searcher.search(&query(0.), &index, &SearchParams::top_k(100)).unwrap();
        assert_eq!(result.len(), 4);
        let result = searcher.search(&query(0.), &index, &SearchParams::top_k(0)).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_exclude() {
        let index = build(&[("a", 0.), ("b", 0.5)]);
        let searcher = Searcher::new(DistanceConfig::default());
        let params = SearchParams { top_k: Some(1), exclude: Some("a".to_string()) };
        let result = searcher.search(&query(0.), &index, &params).unwrap();
        assert_eq!(ids(&result), ["b"]);
    }

    #[test]
    fn test_search_is_stable() {
        let mut rng = rand::rng();
        let items = (0..500)
            .map(|i| (format!("img{:03}", i), (rng.random_range(0..10) as f32) / 10.))
            .collect::<Vec<_>>();
        let items = items.iter().map(|(id, x)| (id.as_str(), *x)).collect::<Vec<_>>();
        let index = build(&items);
        let searcher = Searcher::new(DistanceConfig::default());
        let params = SearchParams::top_k(50);
        let first = searcher.search(&query(0.3), &index, &params).unwrap();
        for _ in 0..5 {
            let again = searcher.search(&query(0.3), &index, &params).unwrap();
            assert_eq!(ids(&first), ids(&again));
        }

        // 与完整排序的前 50 个一致
        let mut full = searcher.search(&query(0.3), &index, &SearchParams::default()).unwrap();
        assert!(full.windows(2).all(|w| w[0] < w[1]));
        full.truncate(50);
        assert_eq!(ids(&first), ids(&full));
    }

    #[test]
    fn test_empty_index() {
        let index = build(&[]);
        let searcher = Searcher::new(DistanceConfig::default());
        let r = searcher.search(&query(0.), &index, &SearchParams::default());
        assert!(matches!(r, Err(Error::EmptyIndex)));
    }

    #[test]
    fn test_config_mismatch() {
        let index = build(&[("a", 0.)]);
        let searcher = Searcher::new(DistanceConfig::default());
        let q = Query { config: DescriptorConfig::new(Quantization::hsv(2, 1, 1), 0.5), vector: vector(0.) };
        let r = searcher.search(&q, &index, &SearchParams::default());
        assert!(matches!(r, Err(Error::ConfigMismatch { .. })));
    }

    #[test]
    fn test_topk_merge() {
        let mut a = TopKNeighbors::new(Some(2));
        a.push("x", 3.);
        a.push("y", 1.);
        let mut b = TopKNeighbors::new(Some(2));
        b.push("z", 2.);
        b.push("w", 1.);
        let merged = a.merge(b).into_sorted_vec();
        assert_eq!(ids(&merged), ["w", "y"]);
    }
}
