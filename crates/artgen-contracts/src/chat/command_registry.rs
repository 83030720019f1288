#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArgShape {
    None,
    Raw,
    Paths,
}

#[derive(Clone, Copy, Debug)]
pub struct CommandSpec {
    pub command: &'static str,
    pub usage: &'static str,
    pub summary: &'static str,
    pub(crate) args: ArgShape,
}

const fn spec(
    command: &'static str,
    usage: &'static str,
    summary: &'static str,
    args: ArgShape,
) -> CommandSpec {
    CommandSpec {
        command,
        usage,
        summary,
        args,
    }
}

pub const COMMANDS: &[CommandSpec] = &[
    spec("model", "/model NAME", "pick a model, or `auto`", ArgShape::Raw),
    spec("ratio", "/ratio 1:1|3:4|4:3|16:9|9:16", "set the aspect ratio", ArgShape::Raw),
    spec("resolution", "/resolution 1k|2k|4k", "set the Nano Banana Pro tier", ArgShape::Raw),
    spec("count", "/count N", "images per submission", ArgShape::Raw),
    spec("ref", "/ref PATH...", "attach reference images", ArgShape::Paths),
    spec("clear_refs", "/clear_refs", "drop all reference images", ArgShape::None),
    spec("style", "/style VALUE", "replace the [style] token", ArgShape::Raw),
    spec("grid", "/grid VALUE", "replace the <grid> token", ArgShape::Raw),
    spec("unstyle", "/unstyle", "remove the [style] token", ArgShape::None),
    spec("ungrid", "/ungrid", "remove the <grid> token", ArgShape::None),
    spec("negative", "/negative [TEXT]", "set or clear the negative prompt", ArgShape::Raw),
    spec("magic", "/magic", "toggle the magic prompt review step", ArgShape::None),
    spec("preview", "/preview", "show model, size and cost", ArgShape::None),
    spec("submit", "/submit", "compile the request", ArgShape::None),
    spec("help", "/help", "list commands", ArgShape::None),
    spec("quit", "/quit", "leave the session", ArgShape::None),
];

pub(crate) fn find_command(command: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.command == command)
}

pub fn help_lines() -> Vec<String> {
    let width = COMMANDS
        .iter()
        .map(|spec| spec.usage.len())
        .max()
        .unwrap_or(0);
    COMMANDS
        .iter()
        .map(|spec| format!("{:<width$}  {}", spec.usage, spec.summary))
        .collect()
}
