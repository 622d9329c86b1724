use super::EXIT_SUCCESS;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io::{self, Write};

/// Write the completion script for `C` to `out`, named after the command itself.
fn write_script<C: CommandFactory>(shell: Shell, out: &mut dyn Write) -> io::Result<()> {
    let mut cmd = C::command();
    let bin = cmd.get_name().to_owned();
    clap_complete::generate(shell, &mut cmd, bin, out);
    out.flush()
}

pub fn run<C: CommandFactory>(shell: Shell) -> Result<u8, String> {
    write_script::<C>(shell, &mut io::stdout().lock())
        .map_err(|e| format!("failed to write {shell} completions: {e}"))?;
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[allow(dead_code)]
    #[derive(Parser)]
    #[command(name = "locktool")]
    struct Demo {
        #[arg(long)]
        wait: bool,
    }

    #[test]
    fn script_uses_command_name() {
        let mut buf = Vec::new();
        write_script::<Demo>(Shell::Bash, &mut buf).unwrap();
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("locktool"));
        assert!(script.contains("--wait"));
    }

    #[test]
    fn every_shell_produces_a_script() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::Elvish, Shell::PowerShell] {
            let mut buf = Vec::new();
            write_script::<Demo>(shell, &mut buf).unwrap();
            assert!(!buf.is_empty(), "{shell}");
        }
    }
}
