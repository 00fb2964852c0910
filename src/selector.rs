// src/selector.rs
//
// =============================================================================
// SDFORGE: SELECTOR ENGINE
// =============================================================================
//
// The five selector syntaxes that can appear inside a chunk-binding
// bracket: `[N]` (first N), `[#i,j,...]` (indices), `[#i-j]` (inclusive
// range), `[keys:a,b]` (lookup by key), `[random:N]` (seeded sample).
// Hand-written tokenizer — the grammar is small and fixed, a regex
// dependency buys nothing here.

use crate::document::VariationEntry;
use crate::error::EngineError;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    All,
    First(u32),
    Random(u32),
    Indices(Vec<usize>),
    Range(usize, usize),
    Keys(Vec<String>),
}

impl Selector {
    pub fn parse(text: &str) -> Result<Selector, EngineError> {
        let s = text.trim();
        if s.is_empty() {
            return Ok(Selector::All);
        }
        if let Some(rest) = s.strip_prefix("keys:") {
            let keys = rest.split(',').map(|k| k.trim().to_string()).collect();
            return Ok(Selector::Keys(keys));
        }
        if let Some(rest) = s.strip_prefix("random:") {
            let n: u32 = rest
                .trim()
                .parse()
                .map_err(|_| EngineError::selector(format!("invalid random count '{rest}'")))?;
            return Ok(Selector::Random(n));
        }
        if let Some(rest) = s.strip_prefix('#') {
            if let Some((lo, hi)) = rest.split_once('-') {
                let lo: usize = lo
                    .trim()
                    .parse()
                    .map_err(|_| EngineError::selector(format!("invalid range start in '{s}'")))?;
                let hi: usize = hi
                    .trim()
                    .parse()
                    .map_err(|_| EngineError::selector(format!("invalid range end in '{s}'")))?;
                if lo > hi {
                    return Err(EngineError::selector(format!(
                        "invalid range '{s}': start ({lo}) is after end ({hi})"
                    )));
                }
                return Ok(Selector::Range(lo, hi));
            }
            let indices = rest
                .split(',')
                .map(|p| {
                    p.trim()
                        .parse::<usize>()
                        .map_err(|_| EngineError::selector(format!("invalid index '{p}' in '{s}'")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Selector::Indices(indices));
        }
        let n: u32 = s
            .parse()
            .map_err(|_| EngineError::selector(format!("unrecognized selector syntax '{s}'")))?;
        Ok(Selector::First(n))
    }

    /// Resolves this selector against an ordered variation-entry list,
    /// returning the indices (in the order to be used as an axis domain)
    /// into `entries`.
    pub fn apply(
        &self,
        entries: &[VariationEntry],
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<usize>, EngineError> {
        let len = entries.len();
        match self {
            Selector::All => Ok((0..len).collect()),
            Selector::First(n) => {
                let take = (*n as usize).min(len);
                Ok((0..take).collect())
            }
            Selector::Random(n) => {
                let mut all: Vec<usize> = (0..len).collect();
                all.shuffle(rng);
                let take = (*n as usize).min(len);
                Ok(all.into_iter().take(take).collect())
            }
            Selector::Indices(idx) => {
                for &i in idx {
                    if i >= len {
                        return Err(EngineError::selector(format!(
                            "index {i} out of range (variation set has {len} entries)"
                        )));
                    }
                }
                Ok(idx.clone())
            }
            Selector::Range(lo, hi) => {
                if *hi >= len {
                    return Err(EngineError::selector(format!(
                        "range end {hi} out of range (variation set has {len} entries)"
                    )));
                }
                Ok((*lo..=*hi).collect())
            }
            Selector::Keys(keys) => {
                let mut out = Vec::with_capacity(keys.len());
                for k in keys {
                    let pos = entries.iter().position(|e| e.key() == k).ok_or_else(|| {
                        EngineError::selector(format!("key '{k}' not found in variation set"))
                    })?;
                    out.push(pos);
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn parses_first_n() {
        assert_eq!(Selector::parse("3").unwrap(), Selector::First(3));
    }

    #[test]
    fn parses_indices() {
        assert_eq!(
            Selector::parse("#0,2,5").unwrap(),
            Selector::Indices(vec![0, 2, 5])
        );
    }

    #[test]
    fn parses_range() {
        assert_eq!(Selector::parse("#1-3").unwrap(), Selector::Range(1, 3));
    }

    #[test]
    fn parses_keys() {
        assert_eq!(
            Selector::parse("keys:happy,sad").unwrap(),
            Selector::Keys(vec!["happy".to_string(), "sad".to_string()])
        );
    }

    #[test]
    fn parses_random() {
        assert_eq!(Selector::parse("random:4").unwrap(), Selector::Random(4));
    }

    #[test]
    fn first_n_beyond_len_returns_whole_set() {
        let entries = vec![
            VariationEntry::Simple(crate::document::Variation {
                key: "a".into(),
                text: "A".into(),
            }),
            VariationEntry::Simple(crate::document::Variation {
                key: "b".into(),
                text: "B".into(),
            }),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let idx = Selector::First(10).apply(&entries, &mut rng).unwrap();
        assert_eq!(idx, vec![0, 1]);
    }

    #[test]
    fn random_n_beyond_len_returns_permutation() {
        let entries = vec![
            VariationEntry::Simple(crate::document::Variation {
                key: "a".into(),
                text: "A".into(),
            }),
            VariationEntry::Simple(crate::document::Variation {
                key: "b".into(),
                text: "B".into(),
            }),
            VariationEntry::Simple(crate::document::Variation {
                key: "c".into(),
                text: "C".into(),
            }),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let idx = Selector::Random(100).apply(&entries, &mut rng).unwrap();
        let mut sorted = idx.clone();
        sorted.sort();
        assert_eq!(sorted, vec![0, 1, 2]);
    }

    #[test]
    fn range_out_of_bounds_errors() {
        let entries = vec![VariationEntry::Simple(crate::document::Variation {
            key: "a".into(),
            text: "A".into(),
        })];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(Selector::Range(0, 5).apply(&entries, &mut rng).is_err());
    }
}
