use super::{ClassificationError, Series, SeriesLabel, SeriesMap, SeriesSummary};
use crate::protocol::{ClassificationConfig, SeriesSignature};
use crate::{MrSlice, Orientation};
use itertools::Itertools;
use ordered_float::OrderedFloat;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// 结构化分组的键. 双回波序列的每个回波各成一组.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
struct GroupKey {
    series_uid: String,
    echo_time_ms: Option<OrderedFloat<f64>>,
}

impl GroupKey {
    fn of(slice: &MrSlice) -> Self {
        Self {
            series_uid: slice.series_uid().to_string(),
            echo_time_ms: slice.acquisition().echo_time_ms.map(OrderedFloat),
        }
    }
}

struct Group {
    key: GroupKey,
    slices: Vec<MrSlice>,
}

impl Group {
    fn repetition_time_ms(&self) -> Option<f64> {
        self.slices[0].acquisition().repetition_time_ms
    }

    fn echo_time_ms(&self) -> Option<f64> {
        self.key.echo_time_ms.map(|t| t.0)
    }

    fn matches(&self, sig: &SeriesSignature) -> bool {
        self.repetition_time_ms()
            .is_some_and(|tr| sig.repetition_time_ms.contains(tr))
            && self
                .echo_time_ms()
                .is_some_and(|te| sig.echo_time_ms.contains(te))
    }

    fn mixed_orientation(&self, tol: f64) -> bool {
        let first = self.slices[0].orientation();
        self.slices
            .iter()
            .any(|s| !s.orientation().approx_eq(&first, tol))
    }

    fn describe(&self) -> String {
        let ms = |v: Option<f64>| v.map_or("?".to_string(), |v| v.to_string());
        format!(
            "{} (TR {} ms, TE {} ms, {} slices)",
            self.key.series_uid,
            ms(self.repetition_time_ms()),
            ms(self.echo_time_ms()),
            self.slices.len()
        )
    }

    fn summary(&self, label: Option<SeriesLabel>) -> SeriesSummary {
        SeriesSummary {
            label,
            series_uid: self.key.series_uid.clone(),
            description: self.slices[0].header().series_description.clone(),
            slices: self.slices.len(),
            repetition_time_ms: self.repetition_time_ms(),
            echo_time_ms: self.echo_time_ms(),
        }
    }
}

/// 序列内的全序: 位置, 实例序号, SOP Instance UID, 来源文件名.
fn slice_order(a: &MrSlice, b: &MrSlice) -> Ordering {
    OrderedFloat(a.position())
        .cmp(&OrderedFloat(b.position()))
        .then(a.instance_number().cmp(&b.instance_number()))
        .then_with(|| a.header().sop_instance_uid.cmp(&b.header().sop_instance_uid))
        .then_with(|| a.source().cmp(b.source()))
}

/// 分组的候选标签: 第一个匹配的签名; 都不匹配时, 单层或多方向的分组作为回退标签的候选.
fn candidate_label(group: &Group, config: &ClassificationConfig) -> Option<SeriesLabel> {
    if let Some(sig) = config.signatures.iter().find(|s| group.matches(s)) {
        return Some(sig.label);
    }
    if group.slices.len() == 1 || group.mixed_orientation(config.orientation_tol) {
        return config
            .signatures
            .iter()
            .find(|s| s.fallback)
            .map(|s| s.label);
    }
    None
}

/// 切片数最多的方向. 数量相同时取排序在前的切片的方向.
fn dominant_orientation(slices: &[MrSlice], tol: f64) -> Orientation {
    let mut clusters: Vec<(Orientation, usize)> = Vec::with_capacity(2);
    for s in slices {
        let o = s.orientation();
        match clusters.iter_mut().find(|(c, _)| c.approx_eq(&o, tol)) {
            Some((_, n)) => *n += 1,
            None => clusters.push((o, 1)),
        }
    }
    clusters
        .into_iter()
        .fold(None, |best: Option<(Orientation, usize)>, cur| match best {
            Some(b) if b.1 >= cur.1 => Some(b),
            _ => Some(cur),
        })
        .map_or(Orientation::AXIAL, |(o, _)| o)
}

fn build_series(
    label: SeriesLabel,
    mut group: Group,
    config: &ClassificationConfig,
) -> Result<Series, ClassificationError> {
    let tol = config.orientation_tol;
    let is_fallback = config
        .signatures
        .iter()
        .any(|s| s.label == label && s.fallback);
    if is_fallback && group.mixed_orientation(tol) {
        let dominant = dominant_orientation(&group.slices, tol);
        let before = group.slices.len();
        group.slices.retain(|s| s.orientation().approx_eq(&dominant, tol));
        log::info!(
            "{label}: kept {} of {before} slices with the dominant orientation",
            group.slices.len()
        );
    }

    let first_orientation = group.slices[0].orientation();
    let first_spacing = group.slices[0].spacing();
    let reason = if let Some(s) = group
        .slices
        .iter()
        .find(|s| !s.orientation().approx_eq(&first_orientation, tol))
    {
        Some(format!("orientation of {} differs", s.source()))
    } else {
        group
            .slices
            .iter()
            .find(|s| !s.spacing().approx_eq(&first_spacing, config.spacing_rel_tol))
            .map(|s| format!("pixel spacing of {} differs", s.source()))
    };
    if let Some(reason) = reason {
        return Err(ClassificationError::InconsistentSeries {
            label,
            series_uid: group.key.series_uid,
            reason,
        });
    }

    Ok(Series {
        label,
        echo_time_ms: group.echo_time_ms(),
        series_uid: group.key.series_uid,
        slices: group.slices,
    })
}

/// 将解码得到的切片分类为语义序列.
///
/// 结果与输入切片的顺序无关: 分组按键排序, 组内切片按位置的全序排序.
pub fn classify(
    slices: Vec<MrSlice>,
    config: &ClassificationConfig,
) -> Result<SeriesMap, ClassificationError> {
    if slices.is_empty() {
        return Err(ClassificationError::NoSlices);
    }

    let mut by_key: BTreeMap<GroupKey, Vec<MrSlice>> = BTreeMap::new();
    for s in slices {
        by_key.entry(GroupKey::of(&s)).or_default().push(s);
    }
    let groups: Vec<Group> = by_key
        .into_iter()
        .map(|(key, slices)| Group {
            key,
            slices: slices.into_iter().sorted_by(slice_order).collect(),
        })
        .collect();
    let labels: Vec<Option<SeriesLabel>> = groups
        .iter()
        .map(|g| candidate_label(g, config))
        .collect();

    let mut chosen: BTreeMap<SeriesLabel, usize> = BTreeMap::new();
    for sig in &config.signatures {
        let candidates: Vec<usize> = labels
            .iter()
            .positions(|l| *l == Some(sig.label))
            .collect();
        let pick = match candidates[..] {
            [] => None,
            [only] => Some(only),
            _ => {
                let exact: Vec<usize> = candidates
                    .iter()
                    .copied()
                    .filter(|&i| groups[i].slices.len() == sig.expected_slices)
                    .collect();
                match exact[..] {
                    [only] => Some(only),
                    _ => {
                        return Err(ClassificationError::AmbiguousSeries {
                            label: sig.label,
                            candidates: candidates.iter().map(|&i| groups[i].describe()).collect(),
                        })
                    }
                }
            }
        };
        if let Some(i) = pick {
            chosen.insert(sig.label, i);
        }
    }
    if let Some(label) = config.required.iter().find(|l| !chosen.contains_key(*l)) {
        return Err(ClassificationError::MissingSeries(*label));
    }

    let mut slots: Vec<Option<Group>> = groups.into_iter().map(Some).collect();
    let mut map = SeriesMap::default();
    for (label, i) in chosen {
        let Some(group) = slots[i].take() else {
            continue;
        };
        let series = build_series(label, group, config)?;
        log::info!(
            "Series {label}: {} ({} slices)",
            series.series_uid(),
            series.len()
        );
        map.series.insert(label, series);
    }
    map.unassigned = slots
        .into_iter()
        .flatten()
        .map(|g| {
            log::info!("Ignoring unassigned group {}", g.describe());
            g.summary(None)
        })
        .collect();
    Ok(map)
}
