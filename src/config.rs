//! Configuração do damper carregada a partir de `damper.toml`.
//!
//! A struct [`DamperConfig`] contém todos os parâmetros configuráveis do
//! controlador. Valores não presentes no arquivo usam defaults sensíveis.
//! As bandas de histerese são validadas em [`DamperConfig::validate`]
//! — configuração inválida é fatal na construção do controlador.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::DamperError;

/// Política de escalada quando uma rajada de erros é detectada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BurstPolicy {
    /// Rajada sobe exatamente um nível por avaliação (padrão).
    EscalateOneLevel,
    /// Rajada só força NORMAL→CAUTION; nunca escala a partir de CAUTION.
    CautionOnly,
}

/// Configuração de nível superior carregada de `damper.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct DamperConfig {
    /// Limite de admissão em modo NORMAL. Deve ser >= 1.
    #[serde(default = "default_base_budget")]
    pub base_budget: u32,

    /// Intervalo de polling do dispatcher em modo NORMAL, em segundos.
    #[serde(default = "default_base_sleep_sec")]
    pub base_sleep_sec: f64,

    /// Janela de observação para contagem de erros, em segundos.
    #[serde(default = "default_window_sec")]
    pub window_sec: u64,

    /// Retenção mínima do log de eventos, em segundos. Deve cobrir a janela.
    #[serde(default = "default_retention_sec")]
    pub retention_sec: u64,

    /// Limite de contagem do log de eventos.
    #[serde(default = "default_retention_max_events")]
    pub retention_max_events: usize,

    /// Constante de suavização exponencial do score, em (0, 1].
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Fator de decaimento do score por tick quando a janela está vazia, em [0, 1).
    #[serde(default = "default_decay")]
    pub decay: f64,

    /// Número de erros na janela que caracteriza uma rajada.
    #[serde(default = "default_burst_threshold")]
    pub burst_threshold: u64,

    /// Limiar de desescalada CAUTION→NORMAL.
    #[serde(default = "default_caution_low")]
    pub caution_low: f64,

    /// Limiar de escalada NORMAL→CAUTION.
    #[serde(default = "default_caution_high")]
    pub caution_high: f64,

    /// Limiar de desescalada THROTTLED→CAUTION.
    #[serde(default = "default_throttle_low")]
    pub throttle_low: f64,

    /// Limiar de escalada CAUTION→THROTTLED.
    #[serde(default = "default_throttle_high")]
    pub throttle_high: f64,

    /// Fator aplicado ao orçamento em modo CAUTION.
    #[serde(default = "default_caution_budget_factor")]
    pub caution_budget_factor: f64,

    /// Fator aplicado ao sleep em modo CAUTION.
    #[serde(default = "default_caution_sleep_factor")]
    pub caution_sleep_factor: f64,

    /// Fator aplicado ao orçamento em modo THROTTLED.
    #[serde(default = "default_throttle_budget_factor")]
    pub throttle_budget_factor: f64,

    /// Fator aplicado ao sleep em modo THROTTLED.
    #[serde(default = "default_throttle_sleep_factor")]
    pub throttle_sleep_factor: f64,

    /// Teto do sleep efetivo, em segundos, para limitar latência no pior caso.
    #[serde(default = "default_max_sleep_sec")]
    pub max_sleep_sec: f64,

    /// Política de escalada em rajada. Veja [`BurstPolicy`].
    #[serde(default = "default_burst_policy")]
    pub burst_policy: BurstPolicy,
}

fn default_base_budget() -> u32 {
    10
}

fn default_base_sleep_sec() -> f64 {
    1.0
}

fn default_window_sec() -> u64 {
    30
}

fn default_retention_sec() -> u64 {
    120
}

fn default_retention_max_events() -> usize {
    4096
}

fn default_alpha() -> f64 {
    0.5
}

fn default_decay() -> f64 {
    0.5
}

fn default_burst_threshold() -> u64 {
    3
}

fn default_caution_low() -> f64 {
    0.1
}

fn default_caution_high() -> f64 {
    0.3
}

fn default_throttle_low() -> f64 {
    0.2
}

fn default_throttle_high() -> f64 {
    0.6
}

fn default_caution_budget_factor() -> f64 {
    0.5
}

fn default_caution_sleep_factor() -> f64 {
    2.0
}

fn default_throttle_budget_factor() -> f64 {
    0.1
}

fn default_throttle_sleep_factor() -> f64 {
    5.0
}

fn default_max_sleep_sec() -> f64 {
    30.0
}

fn default_burst_policy() -> BurstPolicy {
    BurstPolicy::EscalateOneLevel
}

impl Default for DamperConfig {
    fn default() -> Self {
        Self {
            base_budget: default_base_budget(),
            base_sleep_sec: default_base_sleep_sec(),
            window_sec: default_window_sec(),
            retention_sec: default_retention_sec(),
            retention_max_events: default_retention_max_events(),
            alpha: default_alpha(),
            decay: default_decay(),
            burst_threshold: default_burst_threshold(),
            caution_low: default_caution_low(),
            caution_high: default_caution_high(),
            throttle_low: default_throttle_low(),
            throttle_high: default_throttle_high(),
            caution_budget_factor: default_caution_budget_factor(),
            caution_sleep_factor: default_caution_sleep_factor(),
            throttle_budget_factor: default_throttle_budget_factor(),
            throttle_sleep_factor: default_throttle_sleep_factor(),
            max_sleep_sec: default_max_sleep_sec(),
            burst_policy: default_burst_policy(),
        }
    }
}

impl DamperConfig {
    /// Carrega a configuração de `damper.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self, DamperError> {
        Self::load_from(Path::new("damper.toml"))
    }

    /// Carrega a configuração de um caminho explícito (flag `--config`).
    pub fn load_from(path: &Path) -> Result<Self, DamperError> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<DamperConfig>(&contents)?
        } else {
            Self::default()
        };
        Ok(config)
    }

    /// Janela de observação como duração chrono.
    pub fn window(&self) -> Duration {
        Duration::seconds(self.window_sec as i64)
    }

    /// Retenção do log como duração chrono.
    pub fn retention(&self) -> Duration {
        Duration::seconds(self.retention_sec as i64)
    }

    /// Valida os invariantes que tornam a configuração utilizável.
    ///
    /// Cada modo tem a sua banda de histerese: o limiar de desescalada
    /// fica estritamente abaixo do limiar de escalada (`caution_low <
    /// caution_high`, `throttle_low < throttle_high`), e a entrada em
    /// THROTTLED acima da entrada em CAUTION (`caution_high <
    /// throttle_high`). As bandas podem sobrepor-se.
    pub fn validate(&self) -> Result<(), DamperError> {
        if self.base_budget < 1 {
            return Err(DamperError::Config("base_budget must be >= 1".to_string()));
        }
        if !(self.caution_low < self.caution_high) {
            return Err(DamperError::Config(format!(
                "caution_low ({}) must be below caution_high ({})",
                self.caution_low, self.caution_high
            )));
        }
        if !(self.throttle_low < self.throttle_high) {
            return Err(DamperError::Config(format!(
                "throttle_low ({}) must be below throttle_high ({})",
                self.throttle_low, self.throttle_high
            )));
        }
        if !(self.caution_high < self.throttle_high) {
            return Err(DamperError::Config(format!(
                "caution_high ({}) must be below throttle_high ({})",
                self.caution_high, self.throttle_high
            )));
        }
        if !(self.alpha > 0.0 && self.alpha <= 1.0) {
            return Err(DamperError::Config(format!(
                "alpha must be in (0, 1], got {}",
                self.alpha
            )));
        }
        if !(0.0..1.0).contains(&self.decay) {
            return Err(DamperError::Config(format!(
                "decay must be in [0, 1), got {}",
                self.decay
            )));
        }
        if self.window_sec < 1 {
            return Err(DamperError::Config("window_sec must be >= 1".to_string()));
        }
        if self.retention_sec < self.window_sec {
            return Err(DamperError::Config(format!(
                "retention_sec ({}) must cover window_sec ({})",
                self.retention_sec, self.window_sec
            )));
        }
        if self.base_sleep_sec < 0.0 {
            return Err(DamperError::Config(
                "base_sleep_sec must be >= 0".to_string(),
            ));
        }
        for (name, factor) in [
            ("caution_budget_factor", self.caution_budget_factor),
            ("caution_sleep_factor", self.caution_sleep_factor),
            ("throttle_budget_factor", self.throttle_budget_factor),
            ("throttle_sleep_factor", self.throttle_sleep_factor),
        ] {
            if factor <= 0.0 {
                return Err(DamperError::Config(format!(
                    "{name} must be > 0, got {factor}"
                )));
            }
        }
        if self.max_sleep_sec < self.base_sleep_sec {
            return Err(DamperError::Config(format!(
                "max_sleep_sec ({}) must be >= base_sleep_sec ({})",
                self.max_sleep_sec, self.base_sleep_sec
            )));
        }
        Ok(())
    }
}
