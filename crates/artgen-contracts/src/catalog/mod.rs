mod characters;
mod presets;

pub use characters::{CharacterDirectory, CharacterInfo, InMemoryCharacters};
pub use presets::{ModelRequirement, PresetCatalog, PresetEntry, PresetLookup};
