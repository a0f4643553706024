//! # 数据模型模块
//!
//! 定义物理量、测量参数、序列/样品配置、测量数据与运行设置。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `engine/`, `export/` 和 `commands/` 使用
//! - 子模块: quantity, parameter, sequence, sample, data, settings

pub mod data;
pub mod parameter;
pub mod quantity;
pub mod sample;
pub mod sequence;
pub mod settings;

pub use data::MeasurementData;
pub use parameter::{ParameterValue, Parameters};
pub use quantity::{Quantity, Unit};
pub use sample::{Chuck, Position, Sample};
pub use sequence::{make_id, Sequence, SequenceContact, SequenceMeasurement};
pub use settings::RunSettings;
