use std::collections::BTreeMap;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::descriptor::VectorLayout;
use crate::error::{Error, Result};
use crate::region::Region;

/// 计算两个特征向量之间的非负距离，越小越相似
pub trait DistanceMetric: Send + Sync {
    fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32>;
}

/// 作用于单段直方图的距离函数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BinMetric {
    /// sum((p - q)² / (p + q + ε))
    ChiSquared,
    Euclidean,
    /// (sum |p - q|^p)^(1/p)
    Minkowski { p: f32 },
}

impl BinMetric {
    pub const CHI_SQUARED_EPS: f64 = 1e-10;

    pub fn validate(&self) -> Result<()> {
        if let Self::Minkowski { p } = self {
            if !(p.is_finite() && *p >= 1.) {
                return Err(Error::InvalidConfig(format!("minkowski order must be >= 1, got {p}")));
            }
        }
        Ok(())
    }

    /// 调用方需保证 `a` 与 `b` 等长
    #[inline]
    pub fn eval(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            Self::ChiSquared => a
                .iter()
                .zip(b)
                .map(|(&p, &q)| {
                    let (p, q) = (p as f64, q as f64);
                    (p - q) * (p - q) / (p + q + Self::CHI_SQUARED_EPS)
                })
                .sum(),
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(&p, &q)| (p as f64 - q as f64).powi(2))
                .sum::<f64>()
                .sqrt(),
            Self::Minkowski { p: order } => {
                let order = *order as f64;
                a.iter()
                    .zip(b)
                    .map(|(&p, &q)| (p as f64 - q as f64).abs().powf(order))
                    .sum::<f64>()
                    .powf(1. / order)
            }
        }
    }
}

/// 五个区域的权重，顺序同 `Region::ALL`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionWeights(pub [f32; Region::COUNT]);

impl RegionWeights {
    pub fn uniform() -> Self {
        Self([1.; Region::COUNT])
    }

    pub fn get(&self, region: Region) -> f32 {
        self.0[region.index()]
    }

    pub fn validate(&self) -> Result<()> {
        if self.0.iter().any(|w| !(w.is_finite() && *w >= 0.)) {
            return Err(Error::InvalidConfig(format!("invalid region weights: {:?}", self.0)));
        }
        Ok(())
    }
}

impl Default for RegionWeights {
    fn default() -> Self {
        Self::uniform()
    }
}

impl FromStr for RegionWeights {
    type Err = String;

    /// 解析逗号分隔的五个权重，例如 `1,1,1,1,2`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f32>().map_err(|e| format!("{}: {}", v, e)))
            .collect::<Result<Vec<_>, _>>()?;
        let values: [f32; Region::COUNT] = values
            .try_into()
            .map_err(|v: Vec<f32>| format!("expected {} weights, got {}", Region::COUNT, v.len()))?;
        Ok(Self(values))
    }
}

/// 距离计算配置，与索引文件无关，可以在每次搜索时调整
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceConfig {
    pub metric: BinMetric,
    pub region_weights: RegionWeights,
    /// 按阶段名称设置的权重，未设置的阶段权重为 1
    pub stage_weights: BTreeMap<String, f32>,
}

impl Default for DistanceConfig {
    fn default() -> Self {
        Self {
            metric: BinMetric::ChiSquared,
            region_weights: RegionWeights::uniform(),
            stage_weights: BTreeMap::new(),
        }
    }
}

/// 按布局逐段计算距离，再按区域权重和阶段权重加权求和
#[derive(Debug, Clone)]
pub struct WeightedDistance {
    metric: BinMetric,
    segments: Vec<(Range<usize>, f64)>,
    dim: usize,
}

impl WeightedDistance {
    pub fn new(config: &DistanceConfig, layout: &VectorLayout) -> Result<Self> {
        config.metric.validate()?;
        config.region_weights.validate()?;
        for (stage, w) in &config.stage_weights {
            if !(w.is_finite() && *w >= 0.) {
                return Err(Error::InvalidConfig(format!("invalid weight {w} for stage {stage}")));
            }
            if !layout.segments().iter().any(|s| s.stage == stage) {
                return Err(Error::InvalidConfig(format!("unknown descriptor stage: {stage}")));
            }
        }

        let segments = layout
            .segments()
            .iter()
            .map(|s| {
                let stage = config.stage_weights.get(s.stage).copied().unwrap_or(1.);
                let weight = config.region_weights.get(s.region) as f64 * stage as f64;
                (s.range.clone(), weight)
            })
            .collect();
        Ok(Self { metric: config.metric, segments, dim: layout.len() })
    }
}

impl DistanceMetric for WeightedDistance {
    fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: a.len() });
        }
        if b.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: b.len() });
        }
        let mut sum = 0.;
        for (range, weight) in &self.segments {
            if *weight == 0. {
                continue;
            }
            sum += weight * self.metric.eval(&a[range.clone()], &b[range.clone()]);
        }
        Ok(sum as f32)
    }
}
