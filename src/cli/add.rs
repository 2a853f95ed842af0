use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::ColorDBBuilder;
use crate::cli::SubCommandExtend;
use crate::config::{DescriptorOptions, Opts};
use crate::utils::{self, ImageFile, pb_style};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub descriptor: DescriptorOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,webp")]
    pub suffix: String,
    /// 使用文件名生成图片 ID，例：`1980.001.png` => `a1980_001`
    #[arg(long, conflicts_with = "replace")]
    pub make_id: bool,
    /// 在添加到索引之前使用正则表达式对图片路径进行处理
    /// 例：--replace '/path/to/image/(?<name>[0-9]+).jpg' '$name'
    #[arg(short, long, value_names = ["REGEX", "REPLACE"], verbatim_doc_comment)]
    pub replace: Vec<String>,
}

impl AddCommand {
    fn image_id(&self, path: &Path, replace: Option<&(Regex, String)>) -> String {
        if self.make_id {
            return utils::make_id(path);
        }
        let path = path.to_string_lossy();
        match replace {
            Some((re, rep)) => re.replace(&path, rep.as_str()).into_owned(),
            None => path.into_owned(),
        }
    }
}

/// 对扫描结果中重复的图片 ID 给出警告，返回重复的数量
///
/// 重复 ID 的图片会按顺序写入索引，只有最后一张会被保留
fn warn_duplicate_ids(images: &[ImageFile]) -> usize {
    let mut seen = HashSet::with_capacity(images.len());
    let mut duplicates = 0;
    for image in images {
        if !seen.insert(image.id.as_str()) {
            warn!("图片 ID 重复，之前的记录将被覆盖: {} ({})", image.id, image.path.display());
            duplicates += 1;
        }
    }
    duplicates
}

impl SubCommandExtend for AddCommand {
    fn run(&self, opts: &Opts) -> Result<()> {
        let re_suf = utils::suffix_regex(&self.suffix)?;
        let replace = match &self.replace[..] {
            [] => None,
            [re, rep] => Some((Regex::new(re)?, rep.clone())),
            _ => return Err(anyhow!("--replace 需要两个参数")),
        };

        info!("开始扫描目录: {}", self.path.display());
        let images = WalkDir::new(&self.path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry.path().extension().map(|s| re_suf.is_match(&s.to_string_lossy()))
                    == Some(true)
            })
            .map(|entry| {
                let id = self.image_id(entry.path(), replace.as_ref());
                ImageFile { id, path: entry.into_path() }
            })
            .collect::<Vec<_>>();
        info!("找到 {} 张图片", images.len());
        let duplicates = warn_duplicate_ids(&images);
        if duplicates > 0 {
            warn!("{} 张图片的 ID 与之前的图片重复", duplicates);
        }

        let pb = ProgressBar::new(images.len() as u64).with_style(pb_style());
        let mut db = ColorDBBuilder::new(opts.conf_dir.clone())
            .descriptor(self.descriptor.explicit())
            .default_descriptor(self.descriptor.to_config())
            .create(true)
            .progress(pb.clone())
            .open()?;

        let report = db.add_images(images)?;
        pb.finish_and_clear();

        for id in &report.succeeded {
            println!("[OK] Add {}", id);
        }
        for (id, e) in &report.failed {
            eprintln!("[ERR] {}: {}", id, e);
        }

        db.save()?;
        info!("图片添加完成: {} 成功, {} 失败", report.succeeded.len(), report.failed.len());
        Ok(())
    }
}
