use toonforge_contracts::records::CharacterSnapshot;

use crate::references::ImagePart;

pub const CHARACTERS_HEADER: &str = "Characters:";
pub const SCENE_HEADER: &str = "Scene Description:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub text: String,
    /// Sent after the text segment, in this order.
    pub images: Vec<ImagePart>,
}

/// Combines the scenario with the resolved characters.
///
/// With no characters the scenario comes back untouched. Otherwise each
/// character is listed as `- name: description` in input order, followed by
/// the scene section holding the scenario verbatim.
pub fn assemble(
    scenario: &str,
    characters: &[CharacterSnapshot],
    images: Vec<ImagePart>,
) -> AssembledPrompt {
    if characters.is_empty() {
        return AssembledPrompt {
            text: scenario.to_string(),
            images,
        };
    }

    let mut text = String::from(CHARACTERS_HEADER);
    text.push('\n');
    for character in characters {
        let description = character.description.trim();
        if description.is_empty() {
            text.push_str(&format!("- {}\n", character.name));
        } else {
            text.push_str(&format!("- {}: {}\n", character.name, description));
        }
    }
    text.push('\n');
    text.push_str(SCENE_HEADER);
    text.push('\n');
    text.push_str(scenario);

    AssembledPrompt { text, images }
}
