//! Launch command construction.
//!
//! Templates are plain strings with `{flatpak_id}`, `{executable}`,
//! `{core_lib_path}`, `{args}` and `{rom}` placeholders. The template is split
//! into argv honoring single and double quotes before anything is substituted,
//! so paths keep their exact bytes as single arguments.

use std::path::Path;

use romshelf_shared::{Emulator, EmulatorCore};

use super::{EmulatorEngine, EmulatorError};

impl EmulatorEngine {
    /// Build argv for `rom_path`. The core library path is only filled in for
    /// the flagship emulator when a core was resolved.
    pub fn build_command(
        &self,
        emulator: &Emulator,
        core: Option<&EmulatorCore>,
        rom_path: &Path,
        custom_args: &str,
    ) -> Result<Vec<String>, EmulatorError> {
        if !emulator.available {
            return Err(EmulatorError::EmulatorUnavailable {
                id: emulator.id.clone(),
            });
        }

        let core_lib_path = match core {
            Some(core) if emulator.id == self.flagship_id => Some(self.core_path(&core.core_id)),
            _ => None,
        };

        let argv = build_argv(emulator, core_lib_path.as_deref(), rom_path, custom_args);
        tracing::debug!("Built command for {}: {:?}", emulator.id, argv);
        Ok(argv)
    }
}

/// Tokenize the template, then fill placeholders inside each token.
///
/// Substituted values never pass through the tokenizer, so a path stays one
/// argument whatever quotes or whitespace it contains. A token that is exactly
/// `{args}` expands to the tokenized argument string. Tokens left empty by
/// substitution are dropped.
pub fn build_argv(
    emulator: &Emulator,
    core_lib_path: Option<&Path>,
    rom_path: &Path,
    custom_args: &str,
) -> Vec<String> {
    let args = join_args(&emulator.default_args, custom_args);
    let core_lib = core_lib_path
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let rom = rom_path.to_string_lossy();

    let values = [
        ("flatpak_id", emulator.flatpak_id.as_deref().unwrap_or("")),
        ("executable", emulator.executable.as_deref().unwrap_or("")),
        ("core_lib_path", core_lib.as_str()),
        ("args", args.as_str()),
        ("rom", rom.as_ref()),
    ];

    let mut argv = Vec::new();
    for token in tokenize(&emulator.command_template) {
        if token == "{args}" {
            argv.extend(tokenize(&args));
            continue;
        }
        let token = substitute(&token, &values);
        if !token.is_empty() {
            argv.push(token);
        }
    }
    argv
}

/// Replace every known `{name}` in one pass. Unknown names are kept as written.
fn substitute(token: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(token.len());
    let mut rest = token;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after
            .find('}')
            .and_then(|close| {
                let name = &after[..close];
                values
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| (*value, close))
            });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn join_args(default_args: &str, custom_args: &str) -> String {
    match (default_args.trim(), custom_args.trim()) {
        ("", custom) => custom.to_string(),
        (default, "") => default.to_string(),
        (default, custom) => format!("{default} {custom}"),
    }
}

/// Split on whitespace outside quotes.
///
/// Quotes are stripped. Inside a quoted span the other quote character is
/// literal. Empty tokens are dropped.
pub fn tokenize(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in command.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}
