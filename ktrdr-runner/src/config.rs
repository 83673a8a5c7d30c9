//! Declarative strategy configuration (TOML).
//!
//! One document names everything a run needs: data selection, indicator
//! parameters, fuzzy set overrides, model architecture and training
//! hyperparameters, decision shaping, label generation, simulation costs,
//! and risk rules. Everything is validated at load time; the pipeline
//! assumes well-typed records afterwards.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use ktrdr_core::backtest::{BacktestConfig, PositionSizing};
use ktrdr_core::domain::Timeframe;
use ktrdr_core::error::{KtrdrError, Result};
use ktrdr_core::features::{FeatureSpec, PriceContextSpec, ScalerKind, VolumeContextSpec};
use ktrdr_core::fuzzy::{default_rsi_sets, FuzzyEngine, FuzzyGroup, FuzzySet, MembershipFn};
use ktrdr_core::indicators::{build_indicators, Indicator, IndicatorSpec};
use ktrdr_core::labels::ZigZagLabeler;
use ktrdr_core::model::{ClassWeights, SplitRatios, TrainingConfig};

/// The full strategy document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub data: DataSection,
    pub indicators: Vec<IndicatorSpec>,
    /// Fuzzy set overrides per indicator config name (e.g. "rsi").
    /// Declaration order inside each group is preserved.
    #[serde(default)]
    pub fuzzy_sets: BTreeMap<String, Vec<FuzzySetConfig>>,
    pub model: ModelSection,
    #[serde(default)]
    pub decisions: DecisionsSection,
    pub training: TrainingSection,
    pub backtesting: BacktestingSection,
    #[serde(default)]
    pub risk_management: RiskSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSection {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    /// Minimum bars a run must load (warmup headroom).
    #[serde(default = "default_history_required")]
    pub history_required: usize,
}

fn default_history_required() -> usize {
    200
}

/// One fuzzy set as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzySetConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub parameters: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    pub architecture: ArchitectureSection,
    pub training: TrainingConfig,
    #[serde(default)]
    pub features: FeaturesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureSection {
    pub hidden_layers: Vec<usize>,
    #[serde(default = "default_activation")]
    pub activation: String,
    #[serde(default)]
    pub dropout: f64,
}

fn default_activation() -> String {
    "relu".into()
}

/// Feature expansion switches beyond the fuzzy memberships.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturesSection {
    #[serde(default)]
    pub include_price_context: bool,
    #[serde(default = "default_period")]
    pub price_sma_period: usize,
    #[serde(default = "default_return_lags")]
    pub return_lags: Vec<usize>,
    #[serde(default)]
    pub include_volume_context: bool,
    #[serde(default = "default_period")]
    pub volume_period: usize,
    #[serde(default)]
    pub lookback_window: usize,
    #[serde(default = "default_scaler")]
    pub scaler: ScalerKind,
}

fn default_period() -> usize {
    20
}

fn default_return_lags() -> Vec<usize> {
    vec![1]
}

fn default_scaler() -> ScalerKind {
    ScalerKind::ZScore
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            include_price_context: false,
            price_sma_period: default_period(),
            return_lags: default_return_lags(),
            include_volume_context: false,
            volume_period: default_period(),
            lookback_window: 0,
            scaler: default_scaler(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionsSection {
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub filters: FiltersSection,
}

fn default_confidence_threshold() -> f64 {
    0.6
}

impl Default for DecisionsSection {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            confidence_threshold: default_confidence_threshold(),
            filters: FiltersSection::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FiltersSection {
    /// Bars to wait after a closed trade before re-entering.
    #[serde(default)]
    pub cooldown_bars: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSection {
    #[serde(default = "default_method")]
    pub method: String,
    pub labels: LabelsSection,
    #[serde(default)]
    pub data_split: SplitRatios,
    #[serde(default)]
    pub class_weights: ClassWeights,
}

fn default_method() -> String {
    "supervised".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelsSection {
    #[serde(default = "default_label_source")]
    pub source: String,
    pub zigzag_threshold: f64,
    pub label_lookahead: usize,
}

fn default_label_source() -> String {
    "zigzag".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestingSection {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub initial_capital: f64,
    /// Relative commission per fill (e.g. 0.001).
    #[serde(default)]
    pub transaction_costs: f64,
    /// Relative adverse slippage per fill.
    #[serde(default)]
    pub slippage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSection {
    #[serde(default = "default_sizing")]
    pub position_sizing: PositionSizing,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Hard cap on entry notional.
    pub max_position_size: Option<f64>,
}

fn default_sizing() -> PositionSizing {
    PositionSizing::FixedFraction { fraction: 0.95 }
}

impl Default for RiskSection {
    fn default() -> Self {
        Self {
            position_sizing: default_sizing(),
            stop_loss: None,
            take_profit: None,
            max_position_size: None,
        }
    }
}

impl StrategyConfig {
    /// Load and validate a strategy document.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StrategyConfig = toml::from_str(&content)
            .map_err(|e| KtrdrError::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (tests, embedded configs).
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: StrategyConfig = toml::from_str(content)
            .map_err(|e| KtrdrError::Config(format!("parse strategy config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Full load-time validation. Nothing downstream re-checks these.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(KtrdrError::Config("strategy name must not be empty".into()));
        }
        if self.data.symbols.is_empty() {
            return Err(KtrdrError::Config("data.symbols must not be empty".into()));
        }
        if self.data.timeframes.is_empty() {
            return Err(KtrdrError::Config(
                "data.timeframes must not be empty".into(),
            ));
        }
        if self.indicators.is_empty() {
            return Err(KtrdrError::Config("at least one indicator required".into()));
        }

        // Indicator parameters (ranges, inter-parameter constraints).
        for spec in &self.indicators {
            build_indicators(spec)?;
        }
        // Fuzzy references and membership parameters.
        self.build_fuzzy_engine()?;

        if self.model.architecture.activation != "relu" {
            return Err(KtrdrError::Config(format!(
                "unsupported activation '{}' (only \"relu\")",
                self.model.architecture.activation
            )));
        }
        if self.model.architecture.hidden_layers.is_empty() {
            return Err(KtrdrError::Config(
                "model.architecture.hidden_layers must not be empty".into(),
            ));
        }
        self.model.training.validate()?;

        if self.training.method != "supervised" {
            return Err(KtrdrError::Config(format!(
                "unsupported training method '{}'",
                self.training.method
            )));
        }
        if self.training.labels.source != "zigzag" {
            return Err(KtrdrError::Config(format!(
                "unsupported label source '{}'",
                self.training.labels.source
            )));
        }
        // Constructing the labeler checks threshold/lookahead ranges.
        ZigZagLabeler::new(
            self.training.labels.zigzag_threshold,
            self.training.labels.label_lookahead,
        )?;
        self.training.data_split.validate()?;

        if let (Some(start), Some(end)) =
            (self.backtesting.start_date, self.backtesting.end_date)
        {
            if start >= end {
                return Err(KtrdrError::Config(format!(
                    "backtesting.start_date {start} must precede end_date {end}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.decisions.confidence_threshold) {
            return Err(KtrdrError::Config(format!(
                "decisions.confidence_threshold must be in [0, 1], got {}",
                self.decisions.confidence_threshold
            )));
        }
        // Full simulation parameter check, including risk rules.
        self.backtest_config().validate()?;
        Ok(())
    }

    /// Construct the indicator instances in declared order.
    pub fn build_indicator_instances(&self) -> Result<Vec<Box<dyn Indicator>>> {
        let mut out = Vec::new();
        for spec in &self.indicators {
            out.extend(build_indicators(spec)?);
        }
        Ok(out)
    }

    /// Build the fuzzy layer: configured groups override built-in defaults.
    ///
    /// Groups follow indicator declaration order; sets follow their
    /// declaration order in the document. Each group attaches to the
    /// indicator's primary output series (e.g. the MACD line).
    pub fn build_fuzzy_engine(&self) -> Result<FuzzyEngine> {
        for key in self.fuzzy_sets.keys() {
            if !self.indicators.iter().any(|s| &s.name == key) {
                return Err(KtrdrError::Config(format!(
                    "fuzzy_sets references undeclared indicator '{key}'"
                )));
            }
        }

        let mut groups = Vec::new();
        for spec in &self.indicators {
            let instances = build_indicators(spec)?;
            let primary = instances
                .first()
                .map(|i| i.name().to_string())
                .ok_or_else(|| {
                    KtrdrError::Config(format!("indicator '{}' has no outputs", spec.name))
                })?;

            let sets = match self.fuzzy_sets.get(&spec.name) {
                Some(configs) => {
                    let mut sets = Vec::with_capacity(configs.len());
                    for c in configs {
                        sets.push(FuzzySet {
                            name: c.name.clone(),
                            function: MembershipFn::from_parts(&c.kind, &c.parameters)?,
                        });
                    }
                    sets
                }
                None if spec.name == "rsi" => default_rsi_sets(),
                None => continue,
            };
            groups.push(FuzzyGroup {
                indicator: primary,
                sets,
            });
        }

        if groups.is_empty() {
            return Err(KtrdrError::Config(
                "no fuzzy groups: declare fuzzy_sets for at least one indicator".into(),
            ));
        }
        FuzzyEngine::new(groups)
    }

    /// Feature expansion settings for the assembler.
    pub fn feature_spec(&self) -> FeatureSpec {
        let f = &self.model.features;
        FeatureSpec {
            price_context: f.include_price_context.then(|| PriceContextSpec {
                sma_period: f.price_sma_period,
                return_lags: f.return_lags.clone(),
            }),
            volume_context: f
                .include_volume_context
                .then(|| VolumeContextSpec {
                    period: f.volume_period,
                }),
            lookback: f.lookback_window,
        }
    }

    /// Merged training hyperparameters (class weights come from the
    /// `training` section).
    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            class_weights: self.training.class_weights.clone(),
            ..self.model.training.clone()
        }
    }

    /// Simulation parameters for the backtest engine.
    pub fn backtest_config(&self) -> BacktestConfig {
        BacktestConfig {
            initial_capital: self.backtesting.initial_capital,
            commission_rate: self.backtesting.transaction_costs,
            slippage_rate: self.backtesting.slippage,
            confidence_threshold: self.decisions.confidence_threshold,
            sizing: self.risk_management.position_sizing.clone(),
            stop_loss: self.risk_management.stop_loss,
            take_profit: self.risk_management.take_profit,
            max_position_notional: self.risk_management.max_position_size,
            cooldown_bars: self.decisions.filters.cooldown_bars,
        }
    }

    /// blake3 hex of the sections frozen into every artifact: indicators,
    /// fuzzy sets, and model. Serialization is canonical (`BTreeMap` keys,
    /// declaration-ordered vectors), so hash equality implies identical
    /// feature schemas.
    pub fn config_snapshot(&self) -> String {
        let frozen = (&self.indicators, &self.fuzzy_sets, &self.model);
        let json = serde_json::to_string(&frozen).expect("config sections must serialize");
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_config() -> StrategyConfig {
        StrategyConfig::from_toml(&sample_toml()).unwrap()
    }

    pub(crate) fn sample_toml() -> String {
        r#"
name = "neuro_rsi_reversion"

[data]
symbols = ["AAPL"]
timeframes = ["1h"]
history_required = 100

[[indicators]]
name = "rsi"
period = 14

[[fuzzy_sets.rsi]]
name = "low"
type = "triangular"
parameters = [0.0, 0.0, 45.0]

[[fuzzy_sets.rsi]]
name = "neutral"
type = "triangular"
parameters = [30.0, 50.0, 70.0]

[[fuzzy_sets.rsi]]
name = "high"
type = "triangular"
parameters = [55.0, 100.0, 100.0]

[model.architecture]
hidden_layers = [16, 8]
dropout = 0.1

[model.training]
learning_rate = 0.001
batch_size = 32
max_epochs = 50
early_stopping_patience = 10
min_delta = 0.00001
seed = 42

[model.features]
include_price_context = true
price_sma_period = 20
return_lags = [1, 5]

[decisions]
confidence_threshold = 0.55

[training.labels]
zigzag_threshold = 0.04
label_lookahead = 10

[training.data_split]
train = 0.7
validation = 0.15
test = 0.15

[training.class_weights]
mode = "balanced"

[backtesting]
start_date = "2023-01-01"
end_date = "2024-01-01"
initial_capital = 100000.0
transaction_costs = 0.001
slippage = 0.001

[risk_management]
stop_loss = 0.05
take_profit = 0.1

[risk_management.position_sizing]
type = "FIXED_FRACTION"
fraction = 0.9
"#
        .to_string()
    }

    #[test]
    fn sample_config_parses_and_validates() {
        let config = StrategyConfig::from_toml(&sample_toml()).unwrap();
        assert_eq!(config.name, "neuro_rsi_reversion");
        assert_eq!(config.data.timeframes, vec![Timeframe::H1]);
        assert_eq!(config.indicators[0].name, "rsi");
        assert_eq!(config.decisions.confidence_threshold, 0.55);
        assert_eq!(config.training.labels.label_lookahead, 10);
    }

    #[test]
    fn fuzzy_groups_preserve_declaration_order() {
        let config = StrategyConfig::from_toml(&sample_toml()).unwrap();
        let engine = config.build_fuzzy_engine().unwrap();
        assert_eq!(
            engine.feature_names(),
            vec!["rsi_14_low", "rsi_14_neutral", "rsi_14_high"]
        );
    }

    #[test]
    fn missing_fuzzy_sets_fall_back_to_rsi_defaults() {
        let mut config = StrategyConfig::from_toml(&sample_toml()).unwrap();
        config.fuzzy_sets.clear();
        config.validate().unwrap();
        let engine = config.build_fuzzy_engine().unwrap();
        assert_eq!(engine.width(), 3);
        assert_eq!(
            engine.feature_names(),
            vec!["rsi_14_low", "rsi_14_neutral", "rsi_14_high"]
        );
    }

    #[test]
    fn unknown_fuzzy_reference_is_config_error() {
        let mut config = StrategyConfig::from_toml(&sample_toml()).unwrap();
        let sets = config.fuzzy_sets.remove("rsi").unwrap();
        config.fuzzy_sets.insert("macd".into(), sets);
        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "CONFIG");
    }

    #[test]
    fn bad_membership_parameters_rejected() {
        let mut config = StrategyConfig::from_toml(&sample_toml()).unwrap();
        config.fuzzy_sets.get_mut("rsi").unwrap()[0].parameters = vec![45.0, 30.0, 0.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_dates_rejected() {
        let mut config = StrategyConfig::from_toml(&sample_toml()).unwrap();
        config.backtesting.start_date = config.backtesting.end_date;
        assert!(config.validate().is_err());
    }

    #[test]
    fn snapshot_is_stable_and_sensitive() {
        let a = StrategyConfig::from_toml(&sample_toml()).unwrap();
        let b = StrategyConfig::from_toml(&sample_toml()).unwrap();
        assert_eq!(a.config_snapshot(), b.config_snapshot());

        let mut c = StrategyConfig::from_toml(&sample_toml()).unwrap();
        c.indicators[0].params.insert("period".into(), 21.0);
        assert_ne!(a.config_snapshot(), c.config_snapshot());

        // Backtesting parameters are not frozen into the snapshot.
        let mut d = StrategyConfig::from_toml(&sample_toml()).unwrap();
        d.backtesting.initial_capital = 5.0;
        assert_eq!(a.config_snapshot(), d.config_snapshot());
    }

    #[test]
    fn backtest_config_maps_sections() {
        let config = StrategyConfig::from_toml(&sample_toml()).unwrap();
        let bt = config.backtest_config();
        assert_eq!(bt.initial_capital, 100_000.0);
        assert_eq!(bt.commission_rate, 0.001);
        assert_eq!(bt.confidence_threshold, 0.55);
        assert_eq!(bt.stop_loss, Some(0.05));
        assert_eq!(
            bt.sizing,
            PositionSizing::FixedFraction { fraction: 0.9 }
        );
    }

    #[test]
    fn feature_spec_reflects_switches() {
        let config = StrategyConfig::from_toml(&sample_toml()).unwrap();
        let spec = config.feature_spec();
        let pc = spec.price_context.unwrap();
        assert_eq!(pc.sma_period, 20);
        assert_eq!(pc.return_lags, vec![1, 5]);
        assert!(spec.volume_context.is_none());
        assert_eq!(spec.lookback, 0);
    }
}
