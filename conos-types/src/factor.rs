use anyhow::{bail, format_err, Error};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Categorical labels with a fixed level order.
///
/// Each entry holds an index into `levels`, or `None` when the label is missing.
/// The level order drives rendering order and cluster realignment, so every
/// operation preserves it unless the caller reorders explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Factor {
    levels: Vec<String>,
    codes: Vec<Option<u32>>,
}

/// Sort level names numerically when every one of them parses as a number,
/// lexicographically otherwise. Cluster ids "1", "2", "10" stay in numeric order.
fn sort_levels(levels: &mut [String]) {
    let numeric = levels.iter().map(|l| l.parse::<f64>().ok()).collect::<Option<Vec<_>>>();
    match numeric {
        Some(values) if !values.is_empty() => {
            let mut paired = values.into_iter().zip(levels.iter().cloned()).collect::<Vec<_>>();
            paired.sort_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            for (slot, (_, label)) in levels.iter_mut().zip(paired) {
                *slot = label;
            }
        }
        _ => levels.sort(),
    }
}

impl Factor {
    /// Build a factor from labels that are all present.
    pub fn new<S: AsRef<str>>(labels: &[S]) -> Factor {
        Factor::from_options(labels.iter().map(|l| Some(l.as_ref())))
    }

    /// Build a factor from possibly-missing labels. Levels are the distinct labels in natural order.
    pub fn from_options<'a, I>(labels: I) -> Factor
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let labels = labels.into_iter().collect::<Vec<_>>();
        let mut levels = labels.iter().flatten().unique().map(|l| l.to_string()).collect::<Vec<_>>();
        sort_levels(&mut levels);
        let lookup = levels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i as u32))
            .collect::<HashMap<_, _>>();
        let codes = labels.iter().map(|l| l.map(|l| lookup[l])).collect();
        Factor { levels, codes }
    }

    /// Build a factor with an explicit level order. Labels outside `levels` become missing.
    pub fn with_levels<'a, I>(labels: I, levels: Vec<String>) -> Result<Factor, Error>
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut seen = HashSet::new();
        for l in &levels {
            if !seen.insert(l.as_str()) {
                bail!("duplicated factor level '{}'", l);
            }
        }
        let lookup = levels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i as u32))
            .collect::<HashMap<_, _>>();
        let codes = labels
            .into_iter()
            .map(|l| l.and_then(|l| lookup.get(l).copied()))
            .collect();
        Ok(Factor { levels, codes })
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn n_levels(&self) -> usize {
        self.levels.len()
    }

    /// Position of a level name in the level order.
    pub fn level_index(&self, level: &str) -> Option<usize> {
        self.levels.iter().position(|l| l == level)
    }

    pub fn code(&self, i: usize) -> Option<usize> {
        self.codes[i].map(|c| c as usize)
    }

    pub fn label(&self, i: usize) -> Option<&str> {
        self.codes[i].map(|c| self.levels[c as usize].as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&str>> + '_ {
        self.codes.iter().map(|c| c.map(|c| self.levels[c as usize].as_str()))
    }

    /// Number of entries per level, in level order.
    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.levels.len()];
        for c in self.codes.iter().flatten() {
            counts[*c as usize] += 1;
        }
        counts
    }

    /// Entry positions grouped by level, in level order.
    pub fn group_indices(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.levels.len()];
        for (i, c) in self.codes.iter().enumerate() {
            if let Some(c) = c {
                groups[*c as usize].push(i);
            }
        }
        groups
    }

    /// Entry positions carrying `level`, or None if the level doesn't exist.
    pub fn indices_of(&self, level: &str) -> Option<Vec<usize>> {
        let code = self.level_index(level)? as u32;
        Some(
            self.codes
                .iter()
                .enumerate()
                .filter(|(_, c)| **c == Some(code))
                .map(|(i, _)| i)
                .collect(),
        )
    }

    /// Remove levels that no entry uses, keeping the relative order of the rest.
    pub fn drop_unused_levels(&self) -> Factor {
        let counts = self.counts();
        let kept = counts.iter().map(|&c| c > 0).collect::<Vec<_>>();
        let mut remap = vec![None; self.levels.len()];
        let mut levels = Vec::new();
        for (i, level) in self.levels.iter().enumerate() {
            if kept[i] {
                remap[i] = Some(levels.len() as u32);
                levels.push(level.clone());
            }
        }
        let codes = self.codes.iter().map(|c| c.and_then(|c| remap[c as usize])).collect();
        Factor { levels, codes }
    }

    /// Reorder the levels. `order` must be a permutation of the current levels.
    pub fn reorder_levels<S: AsRef<str>>(&self, order: &[S]) -> Result<Factor, Error> {
        if order.len() != self.levels.len() {
            bail!(
                "new level order has {} entries, factor has {} levels",
                order.len(),
                self.levels.len()
            );
        }
        let mut remap = vec![None; self.levels.len()];
        for (new_idx, name) in order.iter().enumerate() {
            let old_idx = self
                .level_index(name.as_ref())
                .ok_or_else(|| format_err!("level '{}' is not part of the factor", name.as_ref()))?;
            if remap[old_idx].is_some() {
                bail!("level '{}' repeated in the new order", name.as_ref());
            }
            remap[old_idx] = Some(new_idx as u32);
        }
        let codes = self.codes.iter().map(|c| c.and_then(|c| remap[c as usize])).collect();
        Ok(Factor {
            levels: order.iter().map(|s| s.as_ref().to_string()).collect(),
            codes,
        })
    }

    /// Select entries by position. Levels are kept as they are.
    pub fn subset(&self, indices: &[usize]) -> Factor {
        Factor {
            levels: self.levels.clone(),
            codes: indices.iter().map(|&i| self.codes[i]).collect(),
        }
    }
}

/// A factor keyed by item name (cell barcodes or sample names).
#[derive(Clone, Debug, PartialEq)]
pub struct NamedFactor {
    names: Vec<String>,
    factor: Factor,
    index: HashMap<String, usize>,
}

impl NamedFactor {
    pub fn new(names: Vec<String>, factor: Factor) -> Result<NamedFactor, Error> {
        if names.len() != factor.len() {
            bail!("{} names given for a factor of length {}", names.len(), factor.len());
        }
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if index.insert(name.clone(), i).is_some() {
                bail!("name '{}' appears more than once", name);
            }
        }
        Ok(NamedFactor { names, factor, index })
    }

    /// Build from (name, label) pairs, levels in natural order.
    pub fn from_pairs<N, L, I>(pairs: I) -> Result<NamedFactor, Error>
    where
        N: Into<String>,
        L: AsRef<str>,
        I: IntoIterator<Item = (N, L)>,
    {
        let (names, labels): (Vec<String>, Vec<L>) = pairs.into_iter().map(|(n, l)| (n.into(), l)).unzip();
        NamedFactor::new(names, Factor::new(&labels))
    }

    /// Build from (name, label) pairs with an explicit level order.
    pub fn from_pairs_with_levels<N, L, I>(pairs: I, levels: Vec<String>) -> Result<NamedFactor, Error>
    where
        N: Into<String>,
        L: AsRef<str>,
        I: IntoIterator<Item = (N, L)>,
    {
        let (names, labels): (Vec<String>, Vec<L>) = pairs.into_iter().map(|(n, l)| (n.into(), l)).unzip();
        let factor = Factor::with_levels(labels.iter().map(|l| Some(l.as_ref())), levels)?;
        NamedFactor::new(names, factor)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn factor(&self) -> &Factor {
        &self.factor
    }

    pub fn levels(&self) -> &[String] {
        self.factor.levels()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Label of `name`; None when the name is unknown or its label is missing.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).and_then(|i| self.factor.label(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.names.iter().map(String::as_str).zip(self.factor.iter())
    }

    /// Keep the given names, in the given order. Unknown names are skipped.
    pub fn restrict_to<S: AsRef<str>>(&self, names: &[S]) -> NamedFactor {
        let positions = names.iter().filter_map(|n| self.position(n.as_ref())).collect::<Vec<_>>();
        let names = positions.iter().map(|&i| self.names[i].clone()).collect::<Vec<_>>();
        let index = names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
        NamedFactor {
            names,
            factor: self.factor.subset(&positions),
            index,
        }
    }

    /// Same names, new level order.
    pub fn reorder_levels<S: AsRef<str>>(&self, order: &[S]) -> Result<NamedFactor, Error> {
        Ok(NamedFactor {
            names: self.names.clone(),
            factor: self.factor.reorder_levels(order)?,
            index: self.index.clone(),
        })
    }

    pub fn drop_unused_levels(&self) -> NamedFactor {
        NamedFactor {
            names: self.names.clone(),
            factor: self.factor.drop_unused_levels(),
            index: self.index.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_natural_level_order() {
        let f = Factor::new(&["10", "2", "1", "2"]);
        assert_eq!(f.levels(), &["1", "2", "10"]);
        assert_eq!(f.counts(), vec![1, 2, 1]);

        let f = Factor::new(&["b", "a", "c", "a"]);
        assert_eq!(f.levels(), &["a", "b", "c"]);
        assert_eq!(f.label(0), Some("b"));
    }

    #[test]
    fn test_with_levels_missing() {
        let f = Factor::with_levels(vec![Some("x"), Some("z"), None], vec!["y".into(), "x".into()]).unwrap();
        assert_eq!(f.code(0), Some(1));
        assert_eq!(f.label(1), None);
        assert_eq!(f.label(2), None);
        assert_eq!(f.counts(), vec![0, 1]);
        assert!(Factor::with_levels(vec![Some("x")], vec!["x".into(), "x".into()]).is_err());
    }

    #[test]
    fn test_reorder_and_drop() {
        let f = Factor::with_levels(
            vec![Some("a"), Some("c"), Some("a")],
            vec!["a".into(), "b".into(), "c".into()],
        )
        .unwrap();
        let dropped = f.drop_unused_levels();
        assert_eq!(dropped.levels(), &["a", "c"]);
        assert_eq!(dropped.iter().collect::<Vec<_>>(), vec![Some("a"), Some("c"), Some("a")]);

        let r = dropped.reorder_levels(&["c", "a"]).unwrap();
        assert_eq!(r.code(0), Some(1));
        assert_eq!(r.code(1), Some(0));
        assert_eq!(r.group_indices(), vec![vec![1], vec![0, 2]]);
        assert!(dropped.reorder_levels(&["c"]).is_err());
        assert!(dropped.reorder_levels(&["c", "q"]).is_err());
    }

    #[test]
    fn test_named_factor() {
        let nf = NamedFactor::from_pairs(vec![("c1", "A"), ("c2", "B"), ("c3", "A")]).unwrap();
        assert_eq!(nf.get("c3"), Some("A"));
        assert_eq!(nf.get("c9"), None);
        let r = nf.restrict_to(&["c3", "c9", "c2"]);
        assert_eq!(r.names(), &["c3", "c2"]);
        assert_eq!(r.levels(), &["A", "B"]);
        assert_eq!(r.get("c2"), Some("B"));
        assert!(NamedFactor::from_pairs(vec![("c1", "A"), ("c1", "B")]).is_err());
    }
}
