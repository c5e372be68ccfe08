use clap::Parser;
use log::info;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use transit_finder::loading::pbf::PbfDecoder;
use transit_finder::loading::petgraph::StreetGraphBuilder;
use transit_finder::routing::sample::{DEFAULT_SEARCH_RADIUS_M, SampleFactory};

/// Build a street graph from an OSM extract, and snap a coordinate onto it
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to an .osm.pbf extract
    pbf: PathBuf,

    #[arg(long, allow_hyphen_values = true)]
    lon: f64,

    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    /// Search radius in metres
    #[arg(long, default_value_t = DEFAULT_SEARCH_RADIUS_M)]
    radius: f64,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    let now = Instant::now();

    let mut decoder = PbfDecoder::new(StreetGraphBuilder::new());
    if let Err(err) = decoder.read_file(&args.pbf) {
        eprintln!("Unable to read {}: {err}", args.pbf.display());
        return ExitCode::FAILURE;
    }
    let graph = decoder.into_handler().build().build();
    info!(
        "Loaded {} vertices, {} edges and {} turn restrictions in {:.2?}",
        graph.graph().node_count(),
        graph.graph().edge_count(),
        graph.num_restrictions(),
        now.elapsed()
    );

    let mut factory = SampleFactory::new(&graph);
    factory.set_search_radius(args.radius);
    let sample = match factory.sample_endpoint(args.lon, args.lat) {
        Ok(sample) => sample,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let osm_id = |vertex| graph.vertex(vertex).map(|data| data.id);
    let output = json!({
        "v0": osm_id(sample.v0),
        "t0": sample.t0,
        "v1": osm_id(sample.v1),
        "t1": sample.t1,
    });
    println!("{output}");

    info!("Elapsed: {:.2?}", now.elapsed());
    ExitCode::SUCCESS
}
