mod scanner;
mod template;

pub use scanner::{
    insert_grid, insert_style, scan, strip_tokens, tokens_of, ScannedPrompt, Token, TokenKind,
};
pub use template::{CompileWarning, CompiledPrompt, PromptTemplateCompiler};
