use anyhow::{bail, Context, Error};
use conos_plot::ProportionRow;
use conos_types::{Conos, Embedding, Factor, FeatureBarcodeMatrix, NamedFactor, SeuratSample};
use flate2::read::MultiGzDecoder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Open a file for reading, decompressing it when the name ends in `.gz`.
pub fn open_input(path: &Path) -> Result<Box<dyn Read>, Error> {
    let file = File::open(path).with_context(|| path.display().to_string())?;
    let reader = BufReader::new(file);
    if path.extension().map_or(false, |e| e == "gz") {
        Ok(Box::new(MultiGzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

#[derive(Debug, Deserialize)]
struct CellRecord {
    cell: String,
    sample: String,
    #[serde(default)]
    cluster: Option<String>,
}

/// Cell annotations: the sample every cell comes from and its cluster, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct CellTable {
    pub cells: Vec<String>,
    pub samples: Vec<String>,
    pub clusters: Vec<Option<String>>,
}

impl CellTable {
    /// Read a `cell,sample,cluster` CSV with a header line. Empty clusters are missing labels.
    pub fn from_reader<R: Read>(input: R) -> Result<CellTable, Error> {
        let mut reader = csv::Reader::from_reader(input);
        let mut table = CellTable {
            cells: Vec::new(),
            samples: Vec::new(),
            clusters: Vec::new(),
        };
        for (i, record) in reader.deserialize::<CellRecord>().enumerate() {
            let record = record.with_context(|| format!("cell table, record {}", i + 1))?;
            table.cells.push(record.cell);
            table.samples.push(record.sample);
            table.clusters.push(record.cluster.filter(|c| !c.is_empty()));
        }
        if table.cells.is_empty() {
            bail!("the cell table is empty");
        }
        Ok(table)
    }

    pub fn from_path(path: &Path) -> Result<CellTable, Error> {
        CellTable::from_reader(open_input(path)?).with_context(|| path.display().to_string())
    }

    /// Cell → sample.
    pub fn sample_factor(&self) -> Result<NamedFactor, Error> {
        NamedFactor::new(self.cells.clone(), Factor::new(&self.samples))
    }

    /// Cell → cluster.
    pub fn cluster_factor(&self) -> Result<NamedFactor, Error> {
        let factor = Factor::from_options(self.clusters.iter().map(|c| c.as_deref()));
        NamedFactor::new(self.cells.clone(), factor)
    }

    /// Cells of every sample, in table order.
    pub fn cells_by_sample(&self) -> BTreeMap<String, Vec<String>> {
        let mut by_sample = BTreeMap::<String, Vec<String>>::new();
        for (cell, sample) in self.cells.iter().zip(&self.samples) {
            by_sample.entry(sample.clone()).or_default().push(cell.clone());
        }
        by_sample
    }

    /// A container with one gene-less sample per sample of the table and the
    /// clusters stored under `clustering`.
    pub fn to_conos(&self, clustering: &str) -> Result<Conos<SeuratSample>, Error> {
        let samples = self
            .cells_by_sample()
            .into_iter()
            .map(|(name, cells)| {
                FeatureBarcodeMatrix::from_triplets(name, cells, Vec::new(), &[]).map(SeuratSample::new)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut conos = Conos::new(samples)?;
        conos.add_clustering(clustering, self.cluster_factor()?);
        Ok(conos)
    }
}

#[derive(Debug, Deserialize)]
struct SampleGroupRecord {
    sample: String,
    group: String,
}

/// Read a `sample,group` CSV into sample → group.
pub fn read_sample_groups<R: Read>(input: R) -> Result<NamedFactor, Error> {
    let mut reader = csv::Reader::from_reader(input);
    let mut pairs = Vec::new();
    for (i, record) in reader.deserialize::<SampleGroupRecord>().enumerate() {
        let record = record.with_context(|| format!("sample groups, record {}", i + 1))?;
        pairs.push((record.sample, record.group));
    }
    NamedFactor::from_pairs(pairs)
}

#[derive(Debug, Deserialize)]
struct EmbeddingRecord {
    cell: String,
    x: f64,
    y: f64,
}

/// Read a `cell,x,y` CSV.
pub fn read_embedding<R: Read>(input: R) -> Result<Embedding, Error> {
    let mut reader = csv::Reader::from_reader(input);
    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<EmbeddingRecord>().enumerate() {
        let record = record.with_context(|| format!("embedding, record {}", i + 1))?;
        rows.push((record.cell, record.x, record.y));
    }
    Embedding::from_rows(rows)
}

/// Write the long proportion table with a header line.
pub fn write_proportions(path: &Path, rows: &[ProportionRow]) -> Result<(), Error> {
    let mut writer = csv::Writer::from_path(path).with_context(|| path.display().to_string())?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}
