use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;
use crate::descriptor::{ColorSpace, DescriptorConfig, Quantization};
use crate::distance::{BinMetric, DistanceConfig, RegionWeights};

static CONF_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "", "colorsearch")
        .and_then(|dirs| dirs.config_dir().to_str().map(str::to_owned))
        .unwrap_or_else(|| ".colorsearch".to_string())
});

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

/// 新建索引时使用的默认描述符参数
pub const DEFAULT_BINS: [u16; 3] = [8, 12, 3];
pub const DEFAULT_ELLIPSE_FRACTION: f32 = 0.75;

#[derive(Parser, Debug, Clone, Default)]
pub struct DescriptorOptions {
    /// 每个颜色通道的分箱数量，默认 8x12x3
    #[arg(long, value_name = "HxSxV", value_parser = parse_bins)]
    pub bins: Option<[u16; 3]>,
    /// 计算直方图使用的颜色空间，默认 hsv
    #[arg(long, value_enum)]
    pub color_space: Option<ColorSpace>,
    /// 中心椭圆半轴占半宽/半高的比例，默认 0.75
    #[arg(long, value_name = "FRACTION")]
    pub ellipse: Option<f32>,
}

impl DescriptorOptions {
    /// 是否在命令行中显式指定了描述符参数
    pub fn is_set(&self) -> bool {
        self.bins.is_some() || self.color_space.is_some() || self.ellipse.is_some()
    }

    /// 显式指定的配置，未指定任何参数时返回 `None`
    pub fn explicit(&self) -> Option<DescriptorConfig> {
        self.is_set().then(|| self.to_config())
    }

    /// 未指定的参数使用默认值
    pub fn to_config(&self) -> DescriptorConfig {
        let quantization = Quantization::new(
            self.color_space.unwrap_or(ColorSpace::Hsv),
            self.bins.unwrap_or(DEFAULT_BINS),
        );
        DescriptorConfig::new(quantization, self.ellipse.unwrap_or(DEFAULT_ELLIPSE_FRACTION))
    }
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 显示的结果数量
    #[arg(short = 'n', long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
    /// 直方图距离
    #[arg(long, value_enum, default_value_t = MetricType::ChiSquared)]
    pub metric: MetricType,
    /// Minkowski 距离的阶数
    #[arg(long, value_name = "P", default_value_t = 2.)]
    pub minkowski_p: f32,
    /// 五个区域的权重，顺序为左上、右上、左下、右下、中心
    #[arg(long, value_name = "W1,W2,W3,W4,W5", default_value = "1,1,1,1,1")]
    pub region_weights: RegionWeights,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SearchOptions {
    pub fn distance_config(&self) -> DistanceConfig {
        let metric = match self.metric {
            MetricType::ChiSquared => BinMetric::ChiSquared,
            MetricType::Euclidean => BinMetric::Euclidean,
            MetricType::Minkowski => BinMetric::Minkowski { p: self.minkowski_p },
        };
        DistanceConfig { metric, region_weights: self.region_weights, ..Default::default() }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "colorsearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// colorsearch 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
    /// 计算特征使用的线程数
    #[arg(short = 'j', long, value_name = "N", default_value_t = num_cpus::get())]
    pub threads: usize,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 添加目录中的图片到索引
    Add(AddCommand),
    /// 从索引中搜索相似图片
    Search(SearchCommand),
    /// 从索引中删除图片
    Remove(RemoveCommand),
    /// 显示索引信息
    Show(ShowCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回索引文件的路径
    pub fn index(&self) -> PathBuf {
        self.path.join("index.csix")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

fn parse_bins(input: &str) -> Result<[u16; 3], String> {
    let parts = input
        .split('x')
        .map(|p| p.trim().parse::<u16>().map_err(|e| format!("无效的分箱数量 {}: {}", p, e)))
        .collect::<Result<Vec<_>, _>>()?;
    let bins = match parts[..] {
        [h, s, v] => [h, s, v],
        _ => return Err(format!("无效的分箱数量: {}", input)),
    };
    Quantization::new(ColorSpace::Hsv, bins).validate().map_err(|e| e.to_string())?;
    Ok(bins)
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// 卡方距离
    ChiSquared,
    /// 欧氏距离
    Euclidean,
    /// Minkowski 距离，阶数由 --minkowski-p 指定
    Minkowski,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}
