//! Visão de status do damper — Status JSON e saída colorida no terminal.
//!
//! Usa as crates `indicatif` para o spinner de execução e `console` para
//! estilização com cores. O [`StatusReport`] é uma cópia imutável do estado
//! do controlador mais a cauda recente do log; serializa diretamente como a
//! estrutura de status documentada. Nunca modifica o controlador.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::event_log::{Event, EventLog};
use crate::throttle::{Evaluation, Mode, ThrottleController, ThrottleState, Transition};

/// Estrutura de status somente leitura: estado do throttle + eventos recentes.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub throttle: ThrottleState,
    /// Total de eventos retidos no log neste momento.
    pub event_count: usize,
    pub recent_events: Vec<Event>,
}

impl StatusReport {
    /// Coleta um snapshot do controlador e a cauda do log.
    pub fn collect(controller: &ThrottleController, log: &EventLog, tail: usize) -> Self {
        Self {
            throttle: controller.snapshot(),
            event_count: log.len(),
            recent_events: log.tail(tail),
        }
    }

    /// Serializa o relatório como JSON identado.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Indicador visual da execução do dispatcher no terminal.
///
/// Exibe um spinner com o modo e score atuais e mensagens coloridas para
/// cada transição: escalada em vermelho/amarelo, desescalada em verde.
pub struct RunProgress {
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl RunProgress {
    /// Inicia o spinner e retorna a instância de progresso.
    pub fn start() -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .expect("invalid template"),
        );
        pb.set_message("NORMAL");
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    fn mode_style(&self, mode: Mode) -> &Style {
        match mode {
            Mode::Normal => &self.green,
            Mode::Caution => &self.yellow,
            Mode::Throttled => &self.red,
        }
    }

    /// Atualiza o spinner e anuncia transições de uma avaliação.
    /// Com `verbose`, imprime também os ticks sem transição.
    pub fn observe(&self, tick: u32, eval: &Evaluation, verbose: bool) {
        let state = &eval.state;
        self.pb.set_message(format!(
            "tick {tick} | {} | score {:.3} | budget {} | sleep {:.1}s",
            state.mode, state.score, state.effective_budget, state.effective_sleep_sec
        ));
        match eval.transition {
            Transition::Hold => {
                if verbose {
                    self.pb
                        .println(format!("  · tick {tick}: {}", state.reasons.join("; ")));
                }
            }
            Transition::Escalate { from, to } => {
                self.pb.println(format!(
                    "  {} {from} -> {to}: {}",
                    self.mode_style(to).apply_to("▲"),
                    state.reasons.join("; ")
                ));
            }
            Transition::Relax { from, to } => {
                self.pb.println(format!(
                    "  {} {from} -> {to}: {}",
                    self.green.apply_to("▼"),
                    state.reasons.join("; ")
                ));
            }
        }
    }

    /// Finaliza o spinner e imprime o relatório de status em JSON.
    pub fn finish(&self, report: &StatusReport) {
        self.pb.finish_and_clear();
        let style = self.mode_style(report.throttle.mode);
        println!();
        println!("{}", style.apply_to("─── Status JSON ───"));
        println!("{}", report.to_json().unwrap_or_default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DamperConfig;
    use crate::event_log::{EventKind, Payload};
    use std::sync::Arc;

    fn setup() -> (Arc<EventLog>, ThrottleController) {
        let config = DamperConfig::default();
        let log = Arc::new(EventLog::new(
            config.retention(),
            config.retention_max_events,
        ));
        let controller = ThrottleController::new(config, Arc::clone(&log)).unwrap();
        (log, controller)
    }

    #[test]
    fn report_carries_snapshot_and_tail() {
        let (log, controller) = setup();
        controller.log_event(EventKind::WorkerError, Payload::new());
        controller.log_event(EventKind::WorkerSuccess, Payload::new());

        let report = StatusReport::collect(&controller, &log, 10);
        assert_eq!(report.throttle.mode, Mode::Normal);
        assert_eq!(report.event_count, 2);
        assert_eq!(report.recent_events.len(), 2);
    }

    #[test]
    fn report_serializes_the_documented_shape() {
        let (log, controller) = setup();
        controller.log_event(EventKind::WorkerError, Payload::new());

        let report = StatusReport::collect(&controller, &log, 5);
        let json: serde_json::Value =
            serde_json::from_str(&report.to_json().unwrap()).unwrap();

        assert_eq!(json["throttle"]["mode"], "NORMAL");
        assert!(json["throttle"]["effective_sched_sleep_sec"].is_number());
        assert!(json["throttle"]["reasons"].is_array());
        assert_eq!(json["recent_events"][0]["kind"], "WORKER_ERROR");
    }

    #[test]
    fn tail_includes_throttle_transitions() {
        let (log, controller) = setup();
        for _ in 0..5 {
            controller.log_event(EventKind::WorkerError, Payload::new());
        }
        controller.evaluate(chrono::Utc::now());

        let report = StatusReport::collect(&controller, &log, 10);
        assert!(report
            .recent_events
            .iter()
            .any(|e| e.kind == EventKind::ThrottleUp));
    }
}
