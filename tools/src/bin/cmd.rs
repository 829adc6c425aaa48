// Command line utility rendering conos-plot charts from CSV tables

use anyhow::{format_err, Context, Error};
use clap::{value_parser, Arg, ArgMatches, Command};
use conos_plot::{
    celltype_proportions, cluster_composition, sample_embeddings, Capabilities, Chart, CompositionParams,
    EmbeddingGridParams, EmbeddingSource, ProportionParams,
};
use conos_types::{Conos, SeuratSample};
use log::info;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use tools::io::{open_input, read_embedding, read_sample_groups, write_proportions, CellTable};

fn common_args(cmd: Command, default_out: &'static str) -> Command {
    cmd.arg(
        Arg::new("CELLS")
            .help("CSV with columns cell,sample,cluster (optionally gzipped)")
            .long("cells")
            .required(true)
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("OUT")
            .help("Output SVG file")
            .short('o')
            .long("out")
            .default_value(default_out)
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("PARAMS")
            .help("JSON file with chart parameters")
            .long("params")
            .value_parser(value_parser!(PathBuf)),
    )
    .arg(
        Arg::new("WIDTH")
            .long("width")
            .default_value("800")
            .value_parser(value_parser!(u32)),
    )
    .arg(
        Arg::new("HEIGHT")
            .long("height")
            .default_value("600")
            .value_parser(value_parser!(u32)),
    )
}

fn path_arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a PathBuf, Error> {
    matches
        .get_one::<PathBuf>(name)
        .ok_or_else(|| format_err!("missing argument {}", name))
}

fn load_params<T: DeserializeOwned + Default>(matches: &ArgMatches) -> Result<T, Error> {
    match matches.get_one::<PathBuf>("PARAMS") {
        Some(path) => {
            let file = File::open(path).with_context(|| path.display().to_string())?;
            serde_json::from_reader(BufReader::new(file)).with_context(|| path.display().to_string())
        }
        None => Ok(T::default()),
    }
}

fn render<C: Chart>(chart: &C, matches: &ArgMatches) -> Result<(), Error> {
    let out = path_arg(matches, "OUT")?;
    let width = matches.get_one::<u32>("WIDTH").copied().unwrap_or(800);
    let height = matches.get_one::<u32>("HEIGHT").copied().unwrap_or(600);
    chart.render_svg(out, (width, height))?;
    info!("wrote {}", out.display());
    Ok(())
}

fn composition(matches: &ArgMatches) -> Result<(), Error> {
    let table = CellTable::from_path(path_arg(matches, "CELLS")?)?;
    let params: CompositionParams = load_params(matches)?;
    let plot = cluster_composition::<SeuratSample>(
        None,
        Some(&table.cluster_factor()?),
        Some(&table.sample_factor()?),
        &params,
        &Capabilities::default(),
    )?;
    render(&plot, matches)
}

fn proportions(matches: &ArgMatches) -> Result<(), Error> {
    let table = CellTable::from_path(path_arg(matches, "CELLS")?)?;
    let groups_path = path_arg(matches, "SAMPLE_GROUPS")?;
    let groups = read_sample_groups(open_input(groups_path)?).with_context(|| groups_path.display().to_string())?;
    let params: ProportionParams = load_params(matches)?;
    let conos: Conos<SeuratSample> = table.to_conos(&params.clustering)?;
    let plot = celltype_proportions(&conos, Some(&groups), &params)?;
    render(&plot, matches)?;
    if let Some(path) = matches.get_one::<PathBuf>("TABLE") {
        write_proportions(path, &plot.into_rows())?;
        info!("wrote {}", path.display());
    }
    Ok(())
}

fn embedding(matches: &ArgMatches) -> Result<(), Error> {
    let table = CellTable::from_path(path_arg(matches, "CELLS")?)?;
    let emb_path = path_arg(matches, "EMBEDDING")?;
    let embedding = read_embedding(open_input(emb_path)?).with_context(|| emb_path.display().to_string())?;
    let params: EmbeddingGridParams = load_params(matches)?;
    let mut conos = table.to_conos("clusters")?;
    conos.set_embedding(embedding);
    let joint = conos
        .embedding()
        .ok_or_else(|| format_err!("no joint embedding"))?;
    let grid = sample_embeddings(
        conos.samples(),
        EmbeddingSource::Shared(joint),
        Some(conos.clustering("clusters")?),
        None,
        &params,
    )?;
    render(&grid, matches)
}

pub fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("conos-plot-cmd")
        .subcommand_required(true)
        .subcommand(common_args(
            Command::new("composition").about("Cluster composition by sample"),
            "composition.svg",
        ))
        .subcommand(
            common_args(
                Command::new("proportions").about("Per-cluster proportions by sample group"),
                "proportions.svg",
            )
            .arg(
                Arg::new("SAMPLE_GROUPS")
                    .help("CSV with columns sample,group")
                    .long("sample-groups")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            )
            .arg(
                Arg::new("TABLE")
                    .help("Also write the long table to this CSV")
                    .long("table")
                    .value_parser(value_parser!(PathBuf)),
            ),
        )
        .subcommand(
            common_args(
                Command::new("embedding").about("One embedding panel per sample"),
                "embedding.svg",
            )
            .arg(
                Arg::new("EMBEDDING")
                    .help("CSV with columns cell,x,y")
                    .long("embedding")
                    .required(true)
                    .value_parser(value_parser!(PathBuf)),
            ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("composition", m)) => composition(m),
        Some(("proportions", m)) => proportions(m),
        Some(("embedding", m)) => embedding(m),
        _ => Err(format_err!("unknown subcommand")),
    }
}
