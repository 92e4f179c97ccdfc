//! ACR 协议配置与选片.
//!
//! [`ProtocolConfig`] 集中存放体模尺寸、选片表、容差区间、序列签名与算法参数.
//! 它只由调用者显式传入, 算法代码中不允许出现这些数值.

use crate::metrics::MetricKind;
use crate::series::SeriesLabel;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod geometry;
mod interval;
mod select;

pub use geometry::{
    AnalysisParams, HoleArrayPair, LowContrastGeometry, PhantomGeometry, RampGeometry,
    ResolutionGeometry, UniformityGeometry, WedgeGeometry,
};
pub use interval::Interval;
pub use select::{select, select_for, SelectedSlice, SliceSelectionError};

/// 选片失败时的处理策略.
///
/// 选片失败本身只牵涉一个度量, 而度量计算出错只会记为该度量的
/// [`FailedMetric`](crate::metrics::FailedMetric), 两者的处理存在取舍.
/// `Abort` 把选片失败当作整次运行的输入错误 (例如缺少 T2 序列或层数不足),
/// 不产出报告, 采集方案配错能及早暴露. `Isolate` 与度量出错同样处理,
/// 只把受影响的度量记为失败, 其余度量照常产出. 默认取 `Abort`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SelectionPolicy {
    /// 任一度量选片失败即终止本次运行.
    #[default]
    Abort,
    /// 只把选片失败的度量记为失败, 其余度量照常执行.
    Isolate,
}

/// 一个语义序列的采集参数签名.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeriesSignature {
    /// 语义标签.
    pub label: SeriesLabel,
    /// TR 区间, 毫秒.
    pub repetition_time_ms: Interval,
    /// TE 区间, 毫秒.
    pub echo_time_ms: Interval,
    /// ACR 协议规定的切片数.
    pub expected_slices: usize,
    /// 不匹配任何签名的单层或多方向分组是否作为该标签的候选.
    #[cfg_attr(feature = "serde", serde(default))]
    pub fallback: bool,
}

/// 序列分类配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ClassificationConfig {
    /// 必须识别出的标签.
    pub required: Vec<SeriesLabel>,
    /// 按顺序匹配的签名. 一个分组取第一个匹配的标签.
    pub signatures: Vec<SeriesSignature>,
    /// 同一序列内像素间距允许的相对误差.
    pub spacing_rel_tol: f64,
    /// 同一序列内方向余弦允许的绝对误差.
    pub orientation_tol: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            required: vec![SeriesLabel::Localizer, SeriesLabel::T1, SeriesLabel::T2],
            signatures: vec![
                SeriesSignature {
                    label: SeriesLabel::Localizer,
                    repetition_time_ms: Interval::below(300.0),
                    echo_time_ms: Interval::at_most(30.0),
                    expected_slices: 1,
                    fallback: true,
                },
                SeriesSignature {
                    label: SeriesLabel::T1,
                    repetition_time_ms: Interval::closed(300.0, 1000.0),
                    echo_time_ms: Interval::at_most(30.0),
                    expected_slices: 11,
                    fallback: false,
                },
                SeriesSignature {
                    label: SeriesLabel::T2,
                    repetition_time_ms: Interval::at_least(1500.0),
                    echo_time_ms: Interval::at_least(60.0),
                    expected_slices: 11,
                    fallback: false,
                },
            ],
            spacing_rel_tol: 1e-3,
            orientation_tol: 1e-3,
        }
    }
}

/// 选片表的一行: 度量 `metric` 使用序列 `series` 的第 `slices` 层 (从 1 开始).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SelectionRule {
    /// 度量.
    pub metric: MetricKind,
    /// 序列.
    pub series: SeriesLabel,
    /// 协议层号, 从 1 开始.
    pub slices: Vec<usize>,
}

impl SelectionRule {
    fn new(metric: MetricKind, series: SeriesLabel, slices: &[usize]) -> Self {
        Self {
            metric,
            series,
            slices: slices.to_vec(),
        }
    }
}

/// 默认的 ACR 选片表.
pub fn acr_selection_table() -> Vec<SelectionRule> {
    use MetricKind::*;
    use SeriesLabel::T1;
    vec![
        SelectionRule::new(GeometricAccuracy, T1, &[1, 5]),
        SelectionRule::new(SlicePositionAccuracy, T1, &[1, 11]),
        SelectionRule::new(SliceThicknessAccuracy, T1, &[1]),
        SelectionRule::new(HighContrastResolution, T1, &[1]),
        SelectionRule::new(LowContrastDetectability, T1, &[8, 9, 10, 11]),
        SelectionRule::new(UniformityGhosting, T1, &[7]),
    ]
}

/// 各度量的容差区间.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ToleranceTable {
    /// 磁场强度不低于该值 (特斯拉) 时使用高场容差.
    pub high_field_min_tesla: f64,
    /// 体模直径, 毫米.
    pub diameter_mm: Interval,
    /// 楔形条长度差, 毫米.
    pub slice_position_mm: Interval,
    /// 层厚, 毫米.
    pub slice_thickness_mm: Interval,
    /// 可分辨的最小孔径, 毫米.
    pub resolution_mm: Interval,
    /// 低对比完整辐条总数.
    pub low_contrast_spokes: Interval,
    /// 高场下的低对比完整辐条总数.
    pub low_contrast_spokes_high_field: Interval,
    /// 图像积分均匀度, 百分比.
    pub piu_percent: Interval,
    /// 高场下的图像积分均匀度, 百分比.
    pub piu_percent_high_field: Interval,
    /// 伪影比, 百分比.
    pub ghosting_percent: Interval,
}

impl Default for ToleranceTable {
    fn default() -> Self {
        Self {
            high_field_min_tesla: 2.9,
            diameter_mm: Interval::closed(188.0, 192.0),
            slice_position_mm: Interval::closed(-5.0, 5.0),
            slice_thickness_mm: Interval::closed(4.3, 5.7),
            resolution_mm: Interval::at_most(1.0),
            low_contrast_spokes: Interval::at_least(9.0),
            low_contrast_spokes_high_field: Interval::at_least(37.0),
            piu_percent: Interval::at_least(87.5),
            piu_percent_high_field: Interval::at_least(82.0),
            ghosting_percent: Interval::at_most(2.5),
        }
    }
}

impl ToleranceTable {
    /// 磁场强度是否属于高场?
    pub fn is_high_field(&self, field_strength_t: Option<f64>) -> bool {
        field_strength_t.is_some_and(|t| t >= self.high_field_min_tesla)
    }
}

/// 完整的协议配置.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct ProtocolConfig {
    /// 协议名称.
    pub name: String,
    /// 协议版本.
    pub version: String,
    /// 选片失败时的处理策略.
    pub selection_policy: SelectionPolicy,
    /// 序列分类.
    pub classification: ClassificationConfig,
    /// 选片表.
    pub selection: Vec<SelectionRule>,
    /// 体模参考尺寸.
    pub geometry: PhantomGeometry,
    /// 容差区间.
    pub tolerances: ToleranceTable,
    /// 算法参数.
    pub analysis: AnalysisParams,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            name: "ACR large phantom".to_string(),
            version: "2015".to_string(),
            selection_policy: SelectionPolicy::default(),
            classification: ClassificationConfig::default(),
            selection: acr_selection_table(),
            geometry: PhantomGeometry::default(),
            tolerances: ToleranceTable::default(),
            analysis: AnalysisParams::default(),
        }
    }
}

/// 配置无法加载.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 读文件失败.
    #[error("cannot read protocol config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML 语法或字段类型错误.
    #[error("cannot parse protocol config: {0}")]
    Parse(String),

    /// 语义上不合法.
    #[error("invalid protocol config: {0}")]
    Invalid(String),
}

impl ProtocolConfig {
    /// 从 TOML 文本加载. 缺失的字段取默认值.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载.
    #[cfg(feature = "serde")]
    pub fn from_toml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 选片表中 `metric` 对应的规则.
    pub fn rule_for(&self, metric: MetricKind) -> Option<&SelectionRule> {
        self.selection.iter().find(|r| r.metric == metric)
    }

    /// 检查配置的语义约束.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        for rule in &self.selection {
            if rule.slices.is_empty() || rule.slices.contains(&0) {
                return invalid(format!(
                    "selection for {} must list 1-based slice numbers",
                    rule.metric
                ));
            }
            if self.selection.iter().filter(|r| r.metric == rule.metric).count() > 1 {
                return invalid(format!("duplicate selection rule for {}", rule.metric));
            }
        }

        let sigs = &self.classification.signatures;
        for (i, sig) in sigs.iter().enumerate() {
            if sigs[..i].iter().any(|s| s.label == sig.label) {
                return invalid(format!("duplicate signature for {}", sig.label));
            }
            if !sig.repetition_time_ms.is_valid() || !sig.echo_time_ms.is_valid() {
                return invalid(format!("empty TR/TE interval for {}", sig.label));
            }
        }
        if let Some(label) = self
            .classification
            .required
            .iter()
            .find(|l| !sigs.iter().any(|s| s.label == **l))
        {
            return invalid(format!("required series {label} has no signature"));
        }

        let t = &self.tolerances;
        let all = [
            ("diameter_mm", t.diameter_mm),
            ("slice_position_mm", t.slice_position_mm),
            ("slice_thickness_mm", t.slice_thickness_mm),
            ("resolution_mm", t.resolution_mm),
            ("low_contrast_spokes", t.low_contrast_spokes),
            ("low_contrast_spokes_high_field", t.low_contrast_spokes_high_field),
            ("piu_percent", t.piu_percent),
            ("piu_percent_high_field", t.piu_percent_high_field),
            ("ghosting_percent", t.ghosting_percent),
        ];
        if let Some((name, _)) = all.iter().find(|(_, i)| !i.is_valid()) {
            return invalid(format!("tolerance {name} is empty"));
        }

        let g = &self.geometry;
        if g.inner_diameter_mm <= 0.0 || g.ramps.slope <= 0.0 {
            return invalid("phantom dimensions must be positive".to_string());
        }
        if g.low_contrast.spokes() == 0 || g.low_contrast.ring_radii_mm.is_empty() {
            return invalid("low-contrast insert needs at least one spoke and ring".to_string());
        }

        let a = &self.analysis;
        let fraction = |v: f64| v > 0.0 && v < 1.0;
        if !fraction(a.floor_fraction) || !fraction(a.signal_fraction) {
            return invalid("floor_fraction and signal_fraction must lie in (0, 1)".to_string());
        }
        let steps = [
            ("edge_step_mm", a.edge_step_mm),
            ("resolution_search_step_mm", a.resolution_search_step_mm),
            ("lcd_search_step_deg", a.lcd_search_step_deg),
            ("uniformity_search_step_mm", a.uniformity_search_step_mm),
        ];
        if let Some((name, _)) = steps.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return invalid(format!("analysis step {name} must be positive"));
        }
        let reaches = [
            ("resolution_search_mm", a.resolution_search_mm),
            ("lcd_search_deg", a.lcd_search_deg),
            ("resolution_modulation", a.resolution_modulation),
            ("lcd_min_cnr", a.lcd_min_cnr),
            ("lcd_noise_floor", a.lcd_noise_floor),
        ];
        if let Some((name, _)) = reaches.iter().find(|(_, v)| !(v.is_finite() && *v >= 0.0)) {
            return invalid(format!("analysis parameter {name} must be finite and non-negative"));
        }
        Ok(())
    }
}
