//! KDLパーサー
//!
//! スタック定義ファイル (stack.kdl) をパースします。
//! 各ノードタイプのパース処理はモジュールに分離されています。

mod compute;
mod delivery;
mod network;
mod storage;

use compute::{parse_cluster, parse_service};
use delivery::{parse_distribution, parse_origin_access_control};
use network::parse_vpc;
use storage::{parse_bucket, parse_deployment};

use crate::error::{Result, StackError};
use crate::model::{StackDefinition, StackEnv};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// KDLファイルをパースしてスタック定義を生成
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<StackDefinition> {
    let content = fs::read_to_string(path.as_ref())?;
    let name = path
        .as_ref()
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

/// KDL文字列をパース
///
/// `stack` ノードが無い場合は `default_name` をスタック名に使います。
pub fn parse_kdl_string(content: &str, default_name: String) -> Result<StackDefinition> {
    let doc: KdlDocument = content.parse()?;
    let mut stack = StackDefinition::new(default_name);
    let mut vpc_seen = false;

    for node in doc.nodes() {
        match node.name().value() {
            "stack" => parse_stack_header(node, &mut stack)?,
            "vpc" => {
                if vpc_seen {
                    return Err(StackError::InvalidConfig(
                        "vpc は1つだけ宣言できます".to_string(),
                    ));
                }
                stack.vpc = parse_vpc(node)?;
                vpc_seen = true;
            }
            "cluster" => {
                if stack.cluster.is_some() {
                    return Err(StackError::InvalidConfig(
                        "cluster は1つだけ宣言できます".to_string(),
                    ));
                }
                stack.cluster = Some(parse_cluster(node)?);
            }
            "service" => stack.services.push(parse_service(node)?),
            "bucket" => stack.buckets.push(parse_bucket(node)?),
            "deployment" => stack.deployments.push(parse_deployment(node)?),
            "origin-access-control" | "origin_access_control" | "oac" => {
                stack
                    .origin_access_controls
                    .push(parse_origin_access_control(node)?);
            }
            "distribution" => stack.distributions.push(parse_distribution(node)?),
            other => {
                // 不明なノードはスキップ
                tracing::debug!(node = other, "Skipping unknown top-level node");
            }
        }
    }

    Ok(stack)
}

/// stack ノード（名前、説明、環境）をパース
fn parse_stack_header(node: &KdlNode, stack: &mut StackDefinition) -> Result<()> {
    if let Some(name) = first_string(node) {
        stack.name = name;
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "description" => stack.description = first_string(child),
                "env" => stack.env = parse_env(child),
                "account" => stack.env.account = non_empty(first_string(child)),
                "region" => stack.env.region = non_empty(first_string(child)),
                _ => {}
            }
        }
    }

    Ok(())
}

fn parse_env(node: &KdlNode) -> StackEnv {
    let mut env = StackEnv::default();
    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "account" => env.account = non_empty(first_string(child)),
                "region" => env.region = non_empty(first_string(child)),
                "availability_zones" | "availability-zones" | "azs" => {
                    env.availability_zones = strings(child);
                }
                _ => {}
            }
        }
    }
    env
}

// テンプレート展開で空文字になった値は未指定として扱う
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 位置引数（名前なしエントリ）
fn args(node: &KdlNode) -> impl Iterator<Item = &KdlValue> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .map(|e| e.value())
}

/// 最初の位置引数を文字列として取得
pub(crate) fn first_string(node: &KdlNode) -> Option<String> {
    args(node).next().and_then(|v| v.as_string()).map(|s| s.to_string())
}

/// 位置引数をすべて文字列として取得
pub(crate) fn strings(node: &KdlNode) -> Vec<String> {
    args(node)
        .filter_map(|v| v.as_string().map(|s| s.to_string()))
        .collect()
}

/// 最初の位置引数を bool として取得（引数なしは true）
pub(crate) fn first_bool(node: &KdlNode) -> Result<bool> {
    match args(node).next() {
        None => Ok(true),
        Some(value) => value.as_bool().ok_or_else(|| {
            StackError::InvalidConfig(format!(
                "{} には真偽値を指定してください",
                node.name().value()
            ))
        }),
    }
}

/// 最初の位置引数を整数として取得
pub(crate) fn first_integer<T: TryFrom<i128>>(node: &KdlNode) -> Result<T> {
    args(node)
        .next()
        .and_then(|v| v.as_integer())
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| {
            StackError::InvalidConfig(format!(
                "{} には範囲内の整数を指定してください",
                node.name().value()
            ))
        })
}

/// 最初の位置引数を FromStr でパース
pub(crate) fn first_parsed<T>(node: &KdlNode) -> Result<T>
where
    T: FromStr<Err = StackError>,
{
    let value = first_string(node).ok_or_else(|| {
        StackError::InvalidConfig(format!("{} には値が必要です", node.name().value()))
    })?;
    value.parse()
}

/// 名前付きプロパティ (key=value) を取得
pub(crate) fn property<'a>(node: &'a KdlNode, key: &str) -> Option<&'a KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_some_and(|n| n.value() == key))
        .map(|e| e.value())
}

/// ノードの id（最初の位置引数）を必須として取得
pub(crate) fn required_id(node: &KdlNode) -> Result<String> {
    first_string(node).ok_or_else(|| {
        StackError::InvalidConfig(format!("{} requires an id", node.name().value()))
    })
}
