//! sorrystack-core
//!
//! スタック定義 (stack.kdl) のデータモデル、KDLパーサー、検証を提供します。
//! VPC・Fargate サービス・S3 バケット・CloudFront ディストリビューションを
//! 宣言的に記述し、合成レイヤーへ渡すための中間表現を組み立てます。

pub mod cidr;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod template;
mod validate;

pub use cidr::{Ipv4Cidr, SubnetPlanner};
pub use error::{Result, StackError};
pub use loader::{load_stack, load_stack_unchecked};
pub use model::*;
pub use parser::{parse_kdl_file, parse_kdl_string};
pub use template::{TemplateProcessor, Variables, extract_variables};
