use anyhow::{bail, Error};
use ndarray::Array2;
use std::collections::HashMap;

/// Two-dimensional coordinates keyed by cell name.
#[derive(Clone, Debug, PartialEq)]
pub struct Embedding {
    cells: Vec<String>,
    coords: Array2<f64>,
    index: HashMap<String, usize>,
}

impl Embedding {
    pub fn new(cells: Vec<String>, coords: Array2<f64>) -> Result<Embedding, Error> {
        if coords.ncols() != 2 {
            bail!("embedding must have 2 columns, got {}", coords.ncols());
        }
        if coords.nrows() != cells.len() {
            bail!("embedding has {} rows for {} cells", coords.nrows(), cells.len());
        }
        let mut index = HashMap::with_capacity(cells.len());
        for (i, cell) in cells.iter().enumerate() {
            if index.insert(cell.clone(), i).is_some() {
                bail!("cell '{}' appears more than once in the embedding", cell);
            }
        }
        Ok(Embedding { cells, coords, index })
    }

    pub fn from_rows<I, S>(rows: I) -> Result<Embedding, Error>
    where
        I: IntoIterator<Item = (S, f64, f64)>,
        S: Into<String>,
    {
        let mut cells = Vec::new();
        let mut flat = Vec::new();
        for (cell, x, y) in rows {
            cells.push(cell.into());
            flat.push(x);
            flat.push(y);
        }
        let coords = Array2::from_shape_vec((cells.len(), 2), flat)?;
        Embedding::new(cells, coords)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    pub fn coords(&self) -> &Array2<f64> {
        &self.coords
    }

    pub fn contains(&self, cell: &str) -> bool {
        self.index.contains_key(cell)
    }

    pub fn get(&self, cell: &str) -> Option<(f64, f64)> {
        self.index.get(cell).map(|&i| (self.coords[[i, 0]], self.coords[[i, 1]]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64, f64)> + '_ {
        self.cells
            .iter()
            .zip(self.coords.rows())
            .map(|(c, row)| (c.as_str(), row[0], row[1]))
    }

    /// Rows for the requested cells, in request order. Cells missing from the embedding are skipped.
    pub fn subset<'a, I>(&self, cells: I) -> Embedding
    where
        I: IntoIterator<Item = &'a str>,
    {
        let rows = cells
            .into_iter()
            .filter_map(|c| self.index.get(c).map(|&i| (c.to_string(), i)))
            .collect::<Vec<_>>();
        let coords = Array2::from_shape_fn((rows.len(), 2), |(r, c)| self.coords[[rows[r].1, c]]);
        let cells = rows.into_iter().map(|(c, _)| c).collect::<Vec<_>>();
        let index = cells.iter().enumerate().map(|(i, c)| (c.clone(), i)).collect();
        Embedding { cells, coords, index }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_subset_keeps_request_order() {
        let emb = Embedding::from_rows(vec![("a", 0.0, 1.0), ("b", 2.0, 3.0), ("c", 4.0, 5.0)]).unwrap();
        let sub = emb.subset(["c", "x", "a"]);
        assert_eq!(sub.cells(), &["c", "a"]);
        assert_eq!(sub.get("c"), Some((4.0, 5.0)));
        assert_eq!(sub.get("b"), None);
    }

    #[test]
    fn test_rejects_duplicates() {
        assert!(Embedding::from_rows(vec![("a", 0.0, 1.0), ("a", 2.0, 3.0)]).is_err());
    }
}
