use odmld_types::{InputBundle, InputPiece};

/// Flattens an input bundle into the plain-text form the library's
/// tokenizer consumes. Role and end markers become sentinel tokens; image
/// and audio pieces become placeholder tags, since tokenizing binary
/// modalities is the library's job, not this crate's.
pub fn render_input_bundle(bundle: &InputBundle) -> String {
    let mut out = String::new();
    for piece in bundle {
        if !out.is_empty() {
            out.push(' ');
        }
        match piece {
            InputPiece::SystemRole => out.push_str("<|system|>"),
            InputPiece::UserRole => out.push_str("<|user|>"),
            InputPiece::ModelRole => out.push_str("<|model|>"),
            InputPiece::End => out.push_str("<|end|>"),
            InputPiece::Text(text) => out.push_str(text),
            InputPiece::Image(bytes) => out.push_str(&format!("<|image:{}|>", bytes.len())),
            InputPiece::Audio(bytes) => out.push_str(&format!("<|audio:{}|>", bytes.len())),
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_role_markers_and_text() {
        let bundle = vec![
            InputPiece::SystemRole,
            InputPiece::Text("be concise".into()),
            InputPiece::End,
        ];
        assert_eq!(render_input_bundle(&bundle), "<|system|> be concise <|end|>");
    }

    #[test]
    fn token_only_bundle_renders_without_text() {
        let bundle = vec![InputPiece::UserRole, InputPiece::End];
        assert_eq!(render_input_bundle(&bundle), "<|user|> <|end|>");
    }
}
