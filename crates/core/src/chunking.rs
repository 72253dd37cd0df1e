use crate::models::DocumentFragment;

/// Fixed splitting policy: fragment ceiling and inter-chunk overlap, both in
/// characters.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 1_500,
            overlap_chars: 200,
        }
    }
}

impl ChunkingConfig {
    /// Forward step between consecutive chunks. Clamped to at least one
    /// character so a misconfigured overlap cannot stall the walk.
    fn stride(&self) -> usize {
        self.max_chars.saturating_sub(self.overlap_chars).max(1)
    }
}

/// Splits one text into overlapping pieces no longer than `max_chars`.
/// Operates on `char` boundaries, never raw bytes.
pub fn split_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();

    if chars.len() <= config.max_chars {
        return vec![text.to_string()];
    }

    let mut pieces = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let end = (start + config.max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += config.stride();
    }

    pieces
}

/// Splits every fragment, carrying the parent's source/page/method onto each
/// piece. Pure and deterministic; fragments within the limit pass through
/// unchanged.
pub fn split_fragments(
    fragments: &[DocumentFragment],
    config: ChunkingConfig,
) -> Vec<DocumentFragment> {
    let mut result = Vec::new();

    for fragment in fragments {
        for piece in split_text(&fragment.text, config) {
            result.push(DocumentFragment::new(
                fragment.source.clone(),
                fragment.page,
                fragment.method,
                piece,
            ));
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionMethod;

    fn config(max_chars: usize, overlap_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chars,
            overlap_chars,
        }
    }

    #[test]
    fn short_text_passes_through_unchanged() {
        let pieces = split_text("short", ChunkingConfig::default());
        assert_eq!(pieces, vec!["short".to_string()]);
    }

    #[test]
    fn every_piece_respects_the_ceiling() {
        let text = "abcdefghij".repeat(40);
        let pieces = split_text(&text, config(100, 20));

        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|piece| piece.chars().count() <= 100));
    }

    #[test]
    fn consecutive_pieces_share_the_overlap() {
        let text: String = ('a'..='z').cycle().take(300).collect();
        let pieces = split_text(&text, config(100, 20));

        for pair in pieces.windows(2) {
            let tail: String = pair[0].chars().skip(pair[0].chars().count() - 20).collect();
            let head: String = pair[1].chars().take(20).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn dropping_overlaps_reconstructs_the_source() {
        let text: String = ('a'..='z').cycle().take(777).collect();
        let overlap = 20;
        let pieces = split_text(&text, config(100, overlap));

        let mut rebuilt = pieces[0].clone();
        for piece in &pieces[1..] {
            rebuilt.extend(piece.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn splitting_is_deterministic() {
        let text = "Cláusula 1ª — condições gerais. ".repeat(80);
        let first = split_text(&text, ChunkingConfig::default());
        let second = split_text(&text, ChunkingConfig::default());
        assert_eq!(first, second);
    }

    #[test]
    fn overlap_at_or_above_the_ceiling_still_terminates() {
        let text = "x".repeat(50);
        let pieces = split_text(&text, config(10, 10));

        assert!(pieces.iter().all(|piece| piece.chars().count() <= 10));
        assert!(pieces.len() >= 5);
    }

    #[test]
    fn fragment_metadata_survives_splitting() {
        let fragments = vec![DocumentFragment::new(
            "contrato.pdf",
            3,
            ExtractionMethod::Direct,
            "clause ".repeat(50),
        )];

        let pieces = split_fragments(&fragments, config(80, 10));

        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert_eq!(piece.source, "contrato.pdf");
            assert_eq!(piece.page, 3);
            assert_eq!(piece.method, ExtractionMethod::Direct);
        }
    }
}
