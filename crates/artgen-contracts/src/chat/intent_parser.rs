use super::command_registry::{find_command, ArgShape};

/// One line of input in a compose session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeCommand {
    Noop,
    /// Plain text replaces the prompt.
    SetPrompt(String),
    SetModel(String),
    SetRatio(String),
    SetResolution(String),
    SetCount(String),
    AddReferences(Vec<String>),
    ClearReferences,
    InsertStyle(String),
    InsertGrid(String),
    RemoveStyle,
    RemoveGrid,
    SetNegative(Option<String>),
    ToggleMagic,
    Preview,
    Submit,
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts.into_iter().filter(|value| !value.is_empty()).collect(),
        Err(_) => arg.split_whitespace().map(str::to_string).collect(),
    }
}

pub fn parse_command(text: &str) -> ComposeCommand {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ComposeCommand::Noop;
    }

    let Some(slash_tail) = trimmed.strip_prefix('/') else {
        return ComposeCommand::SetPrompt(trimmed.to_string());
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return ComposeCommand::SetPrompt(trimmed.to_string());
    }

    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();
    let Some(spec) = find_command(&command) else {
        return ComposeCommand::Unknown {
            command,
            arg: arg.to_string(),
        };
    };

    let raw = arg.to_string();
    match (spec.command, spec.args) {
        ("model", _) => ComposeCommand::SetModel(raw),
        ("ratio", _) => ComposeCommand::SetRatio(raw),
        ("resolution", _) => ComposeCommand::SetResolution(raw),
        ("count", _) => ComposeCommand::SetCount(raw),
        ("style", _) => ComposeCommand::InsertStyle(raw),
        ("grid", _) => ComposeCommand::InsertGrid(raw),
        ("negative", _) => ComposeCommand::SetNegative(Some(raw).filter(|value| !value.is_empty())),
        (_, ArgShape::Paths) => ComposeCommand::AddReferences(parse_path_args(arg)),
        ("clear_refs", _) => ComposeCommand::ClearReferences,
        ("unstyle", _) => ComposeCommand::RemoveStyle,
        ("ungrid", _) => ComposeCommand::RemoveGrid,
        ("magic", _) => ComposeCommand::ToggleMagic,
        ("preview", _) => ComposeCommand::Preview,
        ("submit", _) => ComposeCommand::Submit,
        ("help", _) => ComposeCommand::Help,
        ("quit", _) => ComposeCommand::Quit,
        _ => ComposeCommand::Unknown { command, arg: raw },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{help_lines, COMMANDS};

    #[test]
    fn plain_text_sets_prompt() {
        assert_eq!(
            parse_command("  a girl, [vibrant-anime-style] "),
            ComposeCommand::SetPrompt("a girl, [vibrant-anime-style]".to_string())
        );
        assert_eq!(parse_command("   "), ComposeCommand::Noop);
    }

    #[test]
    fn settings_commands_keep_raw_argument() {
        assert_eq!(
            parse_command("/model Nano Banana Pro"),
            ComposeCommand::SetModel("Nano Banana Pro".to_string())
        );
        assert_eq!(
            parse_command("/RATIO 16:9"),
            ComposeCommand::SetRatio("16:9".to_string())
        );
        assert_eq!(
            parse_command("/count 4"),
            ComposeCommand::SetCount("4".to_string())
        );
    }

    #[test]
    fn ref_accepts_quoted_paths() {
        assert_eq!(
            parse_command("/ref \"/tmp/a b.png\" c.jpg"),
            ComposeCommand::AddReferences(vec!["/tmp/a b.png".to_string(), "c.jpg".to_string()])
        );
    }

    #[test]
    fn negative_without_text_clears() {
        assert_eq!(parse_command("/negative"), ComposeCommand::SetNegative(None));
        assert_eq!(
            parse_command("/negative blurry, extra fingers"),
            ComposeCommand::SetNegative(Some("blurry, extra fingers".to_string()))
        );
    }

    #[test]
    fn unknown_command_is_reported() {
        assert_eq!(
            parse_command("/blend a.png"),
            ComposeCommand::Unknown {
                command: "blend".to_string(),
                arg: "a.png".to_string()
            }
        );
    }

    #[test]
    fn slash_without_command_is_prompt_text() {
        assert_eq!(
            parse_command("/ is a slash"),
            ComposeCommand::SetPrompt("/ is a slash".to_string())
        );
    }

    #[test]
    fn every_registered_command_parses_to_known_variant() {
        for spec in COMMANDS {
            let parsed = parse_command(&format!("/{} x", spec.command));
            assert!(
                !matches!(parsed, ComposeCommand::Unknown { .. }),
                "{} fell through",
                spec.command
            );
        }
        assert_eq!(help_lines().len(), COMMANDS.len());
    }
}
