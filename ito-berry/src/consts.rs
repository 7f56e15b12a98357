//! 通用常量.

/// 形变时越界像素的哨兵填充值. 平均反射率图中等于该值的像素会被标记为无效.
pub const WARP_FILL: f32 = -666.0;

/// 缓存分析结果的名称.
pub const ANALYSIS_NAME: &str = "ITOCalibration";

/// `Analyzer` 默认使用的评分名.
pub const DEFAULT_SCORE_NAME: &str = "score";

/// 横向 (空间) 相关衰减率的差分间隔, 单位为像素.
pub const LATERAL_CDR_INTERVAL: usize = 3;

/// 轴向 (光谱) 相关衰减率的差分间隔, 单位为采样点.
pub const AXIAL_CDR_INTERVAL: usize = 2;

/// 估计光谱亚采样偏移时的上采样倍率.
pub const AXIAL_UPSAMPLE: usize = 10;

/// 默认横向高斯模糊的标准差, 单位为像素.
pub const DEFAULT_BLUR_SIGMA: f64 = 2.0;

/// 横向高斯模糊核截断倍数 (以标准差计).
pub const BLUR_TRUNCATE: f64 = 4.0;

/// 默认并行评分 worker 个数.
pub const DEFAULT_WORKERS: usize = 4;

/// 互相关配准所接受的最小峰值.
pub const XCORR_MIN_PEAK: f64 = 0.1;

/// 结构相似度 (SSIM) 参数.
///
/// 这组参数与 Wang et al. 的高斯加权形式一致.
pub mod ssim {
    /// 高斯窗标准差.
    pub const SIGMA: f64 = 1.5;

    /// 高斯窗截断倍数. 窗宽为 `2 * (TRUNCATE * SIGMA + 0.5) as usize + 1`, 即 11.
    pub const TRUNCATE: f64 = 3.5;

    /// 亮度项稳定常数系数.
    pub const K1: f64 = 0.01;

    /// 对比度项稳定常数系数.
    pub const K2: f64 = 0.03;

    /// 浮点数据的动态范围 `[-1, 1]`.
    pub const DATA_RANGE: f64 = 2.0;
}

/// 仅保留平移时, 对原变换的容忍阈值.
pub mod coerce {
    /// 缩放因子相对 1 的最大偏离.
    pub const MAX_SCALE_DRIFT: f64 = 0.005;

    /// 最大旋转角, 单位为度.
    pub const MAX_ROTATION_DEG: f64 = 0.2;
}
