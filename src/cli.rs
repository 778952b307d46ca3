//! Interface de linha de comando do damper baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, demo)
//! e flags globais (--config, --verbose).

use clap::{Parser, Subcommand};

/// damper — Controlador de throttling adaptativo para dispatchers de tarefas.
#[derive(Debug, Parser)]
#[command(name = "damper", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração (padrão: damper.toml).
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa uma carga de trabalho simulada através do controlador.
    Run {
        /// Número de ciclos do dispatcher.
        #[arg(long, default_value_t = 20)]
        ticks: u32,

        /// Fração de tarefas que falham, entre 0.0 e 1.0.
        #[arg(long, default_value_t = 0.2)]
        fail_rate: f64,

        /// Semente do gerador determinístico de falhas.
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },

    /// Executa o cenário embutido de rajada de erros e recuperação.
    Demo,
}
