//! # YAML 配置加载
//!
//! 读取序列、样品与卡盘配置文件。
//!
//! ## 功能
//! - 按类型加载并补全缺省字段
//! - 列出目录中的全部 `*.yaml` 配置
//!
//! ## 依赖关系
//! - 被 `commands/validate.rs`, `commands/run.rs`, `commands/list.rs` 调用
//! - 使用 `models/sequence.rs`, `models/sample.rs`
//! - 使用 `serde_yaml` 与 `glob`

use crate::error::{PqcError, Result};
use crate::models::{Chuck, Sample, Sequence};

use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// 读取文件内容
fn read_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(PqcError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    fs::read_to_string(path).map_err(|e| PqcError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })
}

/// 解析为指定类型，错误信息附带文件路径
fn parse_typed<T: DeserializeOwned>(content: &str, format: &str, path: &Path) -> Result<T> {
    serde_yaml::from_str(content).map_err(|e| PqcError::ParseError {
        format: format.to_string(),
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// 加载任意 YAML 配置
pub fn load_config(path: &Path) -> Result<Value> {
    let content = read_file(path)?;
    parse_typed(&content, "yaml", path)
}

/// 从字符串解析序列
pub fn parse_sequence_str(content: &str) -> Result<Sequence> {
    let mut sequence: Sequence = serde_yaml::from_str(content)?;
    sequence.normalize();
    Ok(sequence)
}

/// 加载序列配置
pub fn load_sequence(path: &Path) -> Result<Sequence> {
    let content = read_file(path)?;
    let mut sequence: Sequence = parse_typed(&content, "sequence", path)?;
    sequence.normalize();
    Ok(sequence)
}

/// 加载样品配置
pub fn load_sample(path: &Path) -> Result<Sample> {
    let content = read_file(path)?;
    parse_typed(&content, "sample", path)
}

/// 加载卡盘配置
pub fn load_chuck(path: &Path) -> Result<Chuck> {
    let content = read_file(path)?;
    parse_typed(&content, "chuck", path)
}

/// 列出目录中的配置文件，返回 (名称, 路径)，按路径排序
pub fn list_configs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Err(PqcError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }

    let pattern = dir.join("*.yaml");
    let pattern = pattern.to_string_lossy();
    let entries = glob::glob(&pattern).map_err(|e| {
        PqcError::InvalidArgument(format!("Invalid pattern '{}': {}", pattern, e))
    })?;

    let mut items = Vec::new();
    for path in entries.filter_map(|e| e.ok()) {
        let data = load_config(&path)?;
        let name = data
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        items.push((name, path));
    }

    items.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sequence_str() {
        let sequence = parse_sequence_str(
            "id: s1\nname: Sequence 1\ncontacts:\n  - name: Flute 1\n    contact_id: flute_1\n",
        )
        .unwrap();
        assert_eq!(sequence.id, "s1");
        assert_eq!(sequence.contacts[0].id, "Flute_1");
    }

    #[test]
    fn test_parse_sequence_missing_name() {
        assert!(parse_sequence_str("id: s1\ncontacts: []\n").is_err());
    }

    #[test]
    fn test_list_configs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.yaml"), "id: b\nname: Bravo\n").unwrap();
        fs::write(dir.path().join("a.yaml"), "id: a\nname: Alpha\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let items = list_configs(dir.path()).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, "Alpha");
        assert!(items[0].1.ends_with("a.yaml"));
        assert_eq!(items[1].0, "Bravo");
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_sequence(Path::new("/nonexistent/sequence.yaml"));
        assert!(matches!(result, Err(PqcError::FileNotFound { .. })));
    }

    #[test]
    fn test_load_sample_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.yaml");
        fs::write(
            &path,
            "id: hmw\nname: HMW\ncontacts:\n  - id: c1\n    name: C1\n    pos: {x: 0, y: 0, z: 0}\n",
        )
        .unwrap();
        let sample = load_sample(&path).unwrap();
        assert_eq!(sample.contacts.len(), 1);
    }
}
