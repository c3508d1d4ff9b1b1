// crates/mh_config/src/tracking_config.rs

//! TrackingConfig - 粒子追踪配置
//!
//! 追踪容差、逐边界的交互模型、拖曳力与波浪模型字典。
//! 模型字典中的 `type` 键选择已注册的实现，未注册的名称在
//! [`TrackingConfig::validate`] 中即报告为致命错误，并列出有效名称。

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use glam::DVec3;
use mh_foundation::registry::{Dictionary, ModelRegistry, TYPE_KEY};
use mh_foundation::MhError;
use mh_lagrangian::{
    patch_interaction_registry, BoundaryDispatcher, FaceCrossingTracker, ParticleCloud, TrackingTolerance,
};
use mh_mesh::PolyMesh;
use mh_physics::{
    drag_model_registry, new_drag_model, new_wave_model, wave_model_registry, DragModel, ScaleTable,
    WaveSuperposition,
};

use crate::error::ConfigError;

/// 粒子追踪配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// 追踪容差
    #[serde(default)]
    pub tolerance: TrackingToleranceConfig,
    /// 逐边界的交互模型，未列出的边界使用默认交互
    #[serde(default)]
    pub patches: Vec<PatchInteractionConfig>,
    /// 颗粒所属相的名称
    #[serde(default = "default_phase")]
    pub phase: String,
    /// 拖曳力模型字典
    #[serde(default)]
    pub drag: Option<Dictionary>,
    /// 波浪叠加
    #[serde(default)]
    pub waves: Option<WavesConfig>,
}

fn default_phase() -> String {
    "particles".to_string()
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tolerance: TrackingToleranceConfig::default(),
            patches: Vec::new(),
            phase: default_phase(),
            drag: None,
            waves: None,
        }
    }
}

/// 追踪容差配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingToleranceConfig {
    /// 重心坐标有效性容差
    #[serde(default = "default_barycentric_tol")]
    pub barycentric_tol: f64,
    /// 同时穿越判定容差（相对剩余行程）
    #[serde(default = "default_crossing_tol")]
    pub crossing_tol: f64,
    /// 退化判定容差
    #[serde(default = "default_degenerate_tol")]
    pub degenerate_tol: f64,
    /// 单次推进的最大穿越次数
    #[serde(default = "default_max_crossings")]
    pub max_crossings: usize,
}

fn default_barycentric_tol() -> f64 { TrackingTolerance::STANDARD.barycentric_tol }
fn default_crossing_tol() -> f64 { TrackingTolerance::STANDARD.crossing_tol }
fn default_degenerate_tol() -> f64 { TrackingTolerance::STANDARD.degenerate_tol }
fn default_max_crossings() -> usize { TrackingTolerance::STANDARD.max_crossings }

impl Default for TrackingToleranceConfig {
    fn default() -> Self {
        Self {
            barycentric_tol: default_barycentric_tol(),
            crossing_tol: default_crossing_tol(),
            degenerate_tol: default_degenerate_tol(),
            max_crossings: default_max_crossings(),
        }
    }
}

impl From<TrackingToleranceConfig> for TrackingTolerance {
    fn from(c: TrackingToleranceConfig) -> Self {
        TrackingTolerance {
            barycentric_tol: c.barycentric_tol,
            crossing_tol: c.crossing_tol,
            degenerate_tol: c.degenerate_tol,
            max_crossings: c.max_crossings,
        }
    }
}

/// 单个边界的交互模型
///
/// ```json
/// { "patch": "floor", "type": "rebound", "restitution": 0.8 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchInteractionConfig {
    /// 边界名称
    pub patch: String,
    /// 模型字典（含 `type`）
    #[serde(flatten)]
    pub model: Dictionary,
}

/// 波浪叠加配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavesConfig {
    /// 波浪坐标系原点
    pub origin: [f64; 3],
    /// 平均流方向
    pub direction: [f64; 3],
    /// 平均流速度
    pub speed: f64,
    /// 波浪模型字典列表
    pub models: Vec<Dictionary>,
    /// 沿平均流方向的缩放表 [(x, s)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Vec<(f64, f64)>>,
    /// 横向缩放表
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_scale: Option<Vec<(f64, f64)>>,
}

// ============================================================
// 读写与验证
// ============================================================

impl TrackingConfig {
    /// 从文件加载配置并验证
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: TrackingConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 验证配置有效性
    ///
    /// 未注册的模型名称返回 [`ConfigError::Model`]，其中列出有效名称。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tol = &self.tolerance;
        for (key, value) in [
            ("tolerance.barycentric_tol", tol.barycentric_tol),
            ("tolerance.crossing_tol", tol.crossing_tol),
            ("tolerance.degenerate_tol", tol.degenerate_tol),
        ] {
            if !(value > 0.0 && value < 1e-2) {
                return Err(ConfigError::invalid(key, value, "容差必须在 (0, 1e-2) 范围内"));
            }
        }
        if tol.max_crossings == 0 {
            return Err(ConfigError::invalid("tolerance.max_crossings", 0, "至少允许一次穿越"));
        }

        let registry = patch_interaction_registry();
        let mut seen = HashSet::new();
        for entry in &self.patches {
            if !seen.insert(entry.patch.as_str()) {
                return Err(ConfigError::invalid("patches", &entry.patch, "同一边界重复配置"));
            }
            check_model(&registry, &entry.model, "patches")?;
        }

        if let Some(drag) = &self.drag {
            check_model(&drag_model_registry(), drag, "drag")?;
        }

        if let Some(waves) = &self.waves {
            let d = DVec3::from_array(waves.direction);
            if (d - d.dot(DVec3::Z) * DVec3::Z).length() == 0.0 {
                return Err(ConfigError::invalid("waves.direction", d, "平均流方向不能为竖直方向"));
            }
            if waves.models.is_empty() {
                return Err(ConfigError::Missing("waves.models".to_string()));
            }
            let registry = wave_model_registry();
            for model in &waves.models {
                check_model(&registry, model, "waves.models")?;
            }
        }
        Ok(())
    }

    // ========================================================
    // 构建
    // ========================================================

    /// 追踪容差
    pub fn tracking_tolerance(&self) -> TrackingTolerance {
        self.tolerance.into()
    }

    /// 追踪器
    pub fn build_tracker(&self) -> FaceCrossingTracker {
        FaceCrossingTracker::new(self.tracking_tolerance())
    }

    /// 为配置中列出的边界设置交互模型
    pub fn configure_dispatcher(&self, mesh: &PolyMesh, dispatcher: &mut BoundaryDispatcher) -> Result<(), ConfigError> {
        let registry = patch_interaction_registry();
        for entry in &self.patches {
            let interaction = registry.new_model(&entry.model)?;
            log::info!("Selecting {} for patch {}: {}", registry.family(), entry.patch, interaction.type_name());
            dispatcher.set_interaction(mesh, &entry.patch, interaction)?;
        }
        Ok(())
    }

    /// 将容差与边界交互应用到粒子云
    pub fn configure_cloud(&self, cloud: &mut ParticleCloud) -> Result<(), ConfigError> {
        cloud.set_tolerance(self.tracking_tolerance());
        let shared = cloud.mesh().clone();
        let mesh = shared.read();
        self.configure_dispatcher(&mesh, cloud.dispatcher_mut())
    }

    /// 拖曳力模型（未配置时为 `None`）
    pub fn build_drag(&self) -> Result<Option<Box<dyn DragModel>>, ConfigError> {
        match &self.drag {
            Some(dict) => Ok(Some(new_drag_model(dict, &self.phase)?)),
            None => Ok(None),
        }
    }

    /// 波浪叠加（未配置时为 `None`）
    pub fn build_waves(&self) -> Result<Option<WaveSuperposition>, ConfigError> {
        let Some(cfg) = &self.waves else {
            return Ok(None);
        };
        let models = cfg.models.iter().map(new_wave_model).collect::<Result<Vec<_>, _>>()?;
        let mut waves = WaveSuperposition::new(
            DVec3::from_array(cfg.origin),
            DVec3::from_array(cfg.direction),
            cfg.speed,
            models,
        )?;
        if let Some(points) = &cfg.scale {
            waves = waves.with_scale(ScaleTable::new(points.clone())?);
        }
        if let Some(points) = &cfg.cross_scale {
            waves = waves.with_cross_scale(ScaleTable::new(points.clone())?);
        }
        Ok(Some(waves))
    }
}

/// 检查模型字典的 `type` 是否已注册
fn check_model<T: ?Sized>(registry: &ModelRegistry<T>, dict: &Dictionary, key: &str) -> Result<(), ConfigError> {
    let name = match dict.get(TYPE_KEY) {
        Some(serde_json::Value::String(name)) => name,
        Some(other) => return Err(ConfigError::invalid(format!("{key}.{TYPE_KEY}"), other, "期望字符串")),
        None => return Err(ConfigError::Missing(format!("{key}.{TYPE_KEY}"))),
    };
    if registry.contains(name) {
        Ok(())
    } else {
        let valid = registry.sorted_names();
        log::error!("Unknown {} type {}. Valid {} types are: {:?}", registry.family(), name, registry.family(), valid);
        Err(MhError::unknown_model(registry.family(), name.as_str(), valid).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> TrackingConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TrackingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracking_tolerance(), TrackingTolerance::STANDARD);
        assert!(config.build_drag().unwrap().is_none());
        assert!(config.build_waves().unwrap().is_none());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = parse(json!({}));
        assert_eq!(config.tolerance, TrackingToleranceConfig::default());
        assert_eq!(config.phase, "particles");
        assert!(config.patches.is_empty());
    }

    #[test]
    fn test_invalid_tolerance() {
        let mut config = TrackingConfig::default();
        config.tolerance.crossing_tol = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        let mut config = TrackingConfig::default();
        config.tolerance.max_crossings = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_patch_entries_flatten() {
        let config = parse(json!({
            "patches": [{ "patch": "zMin", "type": "rebound", "restitution": 0.5 }]
        }));
        let entry = &config.patches[0];
        assert_eq!(entry.patch, "zMin");
        assert_eq!(entry.model.get("type"), Some(&json!("rebound")));
        assert_eq!(entry.model.get("restitution"), Some(&json!(0.5)));
        assert!(!entry.model.contains_key("patch"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_patch_rejected() {
        let config = parse(json!({
            "patches": [
                { "patch": "zMin", "type": "stick" },
                { "patch": "zMin", "type": "escape" }
            ]
        }));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_unknown_names_are_fatal() {
        let config = parse(json!({ "patches": [{ "patch": "zMin", "type": "bounce" }] }));
        match config.validate() {
            Err(ConfigError::Model(MhError::UnknownModel { family, name, valid })) => {
                assert_eq!(family, "patchInteraction");
                assert_eq!(name, "bounce");
                assert_eq!(valid, vec!["escape", "rebound", "stick"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let config = parse(json!({ "drag": { "type": "Ergun", "diameter": 1e-3 } }));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Model(MhError::UnknownModel { .. }))
        ));
        assert!(matches!(
            config.build_drag(),
            Err(ConfigError::Model(MhError::UnknownModel { .. }))
        ));

        let config = parse(json!({ "drag": { "diameter": 1e-3 } }));
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn test_build_models() {
        let config = parse(json!({
            "phase": "sand",
            "drag": { "type": "SchillerNaumann", "diameter": 2e-4 },
            "waves": {
                "origin": [0.0, 25.0, 0.0],
                "direction": [1.0, 0.0, 0.0],
                "speed": 2.0,
                "models": [
                    { "type": "Airy", "length": 40.0, "amplitude": 0.5, "phase": 0.0 },
                    { "type": "Airy", "length": 20.0, "amplitude": 0.25, "phase": 1.5708 }
                ],
                "scale": [[100.0, 1.0], [200.0, 0.0]]
            }
        }));
        config.validate().unwrap();

        let drag = config.build_drag().unwrap().unwrap();
        assert_eq!(drag.type_name(), "SchillerNaumann");
        let waves = config.build_waves().unwrap().unwrap();
        assert_eq!(waves.waves().len(), 2);
        let far = DVec3::new(300.0, 25.0, -1.0);
        assert!((waves.velocity(1.0, far) - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_vertical_wave_direction_rejected() {
        let config = parse(json!({
            "waves": {
                "origin": [0.0, 0.0, 0.0],
                "direction": [0.0, 0.0, 1.0],
                "speed": 1.0,
                "models": [{ "type": "Airy", "length": 10.0, "amplitude": 0.1, "phase": 0.0 }]
            }
        }));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_save_and_load() {
        let config = parse(json!({
            "tolerance": { "crossing_tol": 1e-11 },
            "patches": [{ "patch": "xMax", "type": "stick" }]
        }));
        let path = std::env::temp_dir().join(format!("mh_config_tracking_{}.json", std::process::id()));
        config.save_to_file(&path).unwrap();
        let loaded = TrackingConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!((loaded.tolerance.crossing_tol - 1e-11).abs() < 1e-24);
        assert_eq!(loaded.tolerance.max_crossings, TrackingTolerance::STANDARD.max_crossings);
        assert_eq!(loaded.patches, config.patches);
    }
}
