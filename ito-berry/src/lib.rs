#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 对 ITO 薄膜校准样品的 3D 反射率立方体进行配准, 形变与评分,
//! 用以发现成像仪器随时间发生的漂移或失准.
//!
//! 一次运行中有一个模板测量和若干测试测量. 对每个测试测量:
//!
//! 1. 以平均反射率图估计测试到模板的二维仿射变换;
//! 2. 把测试立方体形变到模板坐标系, 并标记没有数据覆盖的区域;
//! 3. 在共同有效区域上计算五项相似度评分, 取平均值作为校准评分;
//! 4. 形变结果与评分按模板身份持久化, 之后的评分只需读取形变结果.
//!
//! # 注意
//!
//! 1. 在调用方违反前置条件时 (例如形状不一致的分析结果), 程序会直接 panic.
//!   可以预期的运行时失败 (配准失败, 缓存缺失, 数据含 `NaN`) 都以返回值表达.
//! 2. 打开 `rayon` feature 后, 单个测量内部的形变, 光谱相关与高斯滤波会并行执行;
//!   多个测量之间的并行由 [`pipeline::Scorer`] 自己的 worker 池负责.
//!
//! # 开发计划
//!
//! ### 基于 FFT 的一维 / 二维 full 互相关 ✅
//!
//! 实现位于 `ito-berry/src/signal`.
//!
//! ### 三次样条插值 ✅
//!
//! 用于光谱维 10 倍上采样. 实现位于 `ito-berry/src/fitting`.
//!
//! ### 互相关平移配准 & 角点特征仿射配准 ✅
//!
//! 实现位于 `ito-berry/src/align`.
//!
//! ### 立方体形变与无效区域掩膜 ✅
//!
//! 实现位于 `ito-berry/src/warp.rs`.
//!
//! ### 五项评分与组合评分 ✅
//!
//! 横向互相关, 轴向互相关, SSIM, NRMSE, 平均反射率比.
//!
//! 实现位于 `ito-berry/src/metric`.
//!
//! ### 形变结果缓存 (目录 / 内存) ✅
//!
//! 实现位于 `ito-berry/src/store`.
//!
//! ### 配准与评分流程, 多 worker 评分 ✅
//!
//! 实现位于 `ito-berry/src/pipeline`.
//!
//! ### 完善代码文档 ✅
//!
//! 给每个 public API 提供文档, 并视情况给 private
//! API 提供文档.

/// 二维索引 `(行, 列)`.
pub type Idx2d = (usize, usize);

/// 三维索引 `(行, 列, 光谱)`.
pub type Idx3d = (usize, usize, usize);

pub mod consts;

pub mod data;

pub mod transform;

pub mod signal;

pub mod fitting;

pub mod metric;

pub mod align;

pub mod warp;

pub mod store;

pub mod measurement;

pub mod config;

pub mod debug;

pub mod pipeline;

pub mod prelude;

#[cfg(test)]
mod test_utils;
