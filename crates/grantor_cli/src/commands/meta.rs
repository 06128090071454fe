//! `grantor completions` and `grantor man`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::CommandFactory;

use crate::Cli;

fn write_completions(shell: clap_complete::Shell, out: &mut impl Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, out);
}

fn render_man_page(out: &mut impl Write) -> std::io::Result<()> {
    clap_mangen::Man::new(Cli::command()).render(out)
}

/// Write `grantor.1` plus one page per subcommand into `dir`.
fn write_man_pages(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    clap_mangen::generate_to(Cli::command(), dir)
}

pub(crate) fn handle_completions(
    shell: clap_complete::Shell,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout().lock();
    write_completions(shell, &mut stdout);
    stdout.flush()?;
    Ok(ExitCode::SUCCESS)
}

pub(crate) fn handle_man(output: Option<PathBuf>) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match output {
        Some(dir) => {
            write_man_pages(&dir)
                .map_err(|e| format!("cannot write man pages to {}: {e}", dir.display()))?;
            println!("Wrote man pages to {}", dir.display());
        }
        None => render_man_page(&mut std::io::stdout().lock())?,
    }
    Ok(ExitCode::SUCCESS)
}
