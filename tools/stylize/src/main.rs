/// Classify a GeoJSON geological layer, resolve its legend colors, and report
/// the print scale.

use std::collections::BTreeMap;
use std::fs;

use anyhow::{bail, Context, Result};
use clap::Parser;
use geojson::GeoJson;

use carta_core::{
    Classifier, ClassifyOptions, ClipBox, ConsolidateConfig, Crs, Feature, FeatureCollection,
    PaletteConfig, ScaleConfig, Session,
};

#[derive(Parser, Debug)]
#[command(name = "stylize", about = "Classify a GeoJSON geological layer and resolve legend colors")]
struct Args {
    /// Input GeoJSON feature collection.
    input: String,

    /// Write the per-group color audit trail to this JSON file.
    #[arg(long)]
    audit: Option<String>,

    /// Treat coordinates as already projected (metres) instead of degrees.
    #[arg(long)]
    projected: bool,

    /// Figure width in millimetres.
    #[arg(long, default_value_t = 180.0)]
    fig_width: f64,

    /// Margin per side in millimetres.
    #[arg(long, default_value_t = 0.0)]
    margin: f64,

    /// Clip the layer to `min_x,min_y,max_x,max_y` (layer coordinates)
    /// after classification.
    #[arg(long, value_name = "BBOX")]
    bbox: Option<String>,

    /// Absorb polygons below 1 mm² at the computed scale before coloring.
    #[arg(long)]
    consolidate: bool,
}

fn parse_bbox(text: &str) -> Result<ClipBox> {
    let parts: Vec<f64> = text
        .split(',')
        .map(|p| p.trim().parse::<f64>().with_context(|| format!("bad bbox component '{p}'")))
        .collect::<Result<_>>()?;
    let [min_x, min_y, max_x, max_y] = parts[..] else {
        bail!("bbox must be min_x,min_y,max_x,max_y");
    };
    Ok(ClipBox { min_x, min_y, max_x, max_y })
}

fn read_layer(path: &str, crs: Crs) -> Result<FeatureCollection> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let gj: GeoJson = text.parse().with_context(|| format!("parsing {path}"))?;
    let GeoJson::FeatureCollection(collection) = gj else {
        bail!("{path} is not a GeoJSON FeatureCollection");
    };

    let mut features = Vec::new();
    for f in collection.features {
        let Some(geom) = f.geometry else { continue };
        let geometry = match geo::Geometry::<f64>::try_from(geom) {
            Ok(geo::Geometry::Polygon(p)) => geo::MultiPolygon(vec![p]),
            Ok(geo::Geometry::MultiPolygon(mp)) => mp,
            _ => continue,
        };
        let mut feature = Feature::new(geometry);
        if let Some(props) = f.properties {
            for (key, value) in props {
                let text = match value {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Null => String::new(),
                    other => other.to_string(),
                };
                feature.set(&key, text);
            }
        }
        features.push(feature);
    }
    if features.is_empty() {
        bail!("no polygon features in {path}");
    }
    Ok(FeatureCollection::new(features, crs))
}

fn main() -> Result<()> {
    let args = Args::parse();
    let crs = if args.projected { Crs::Projected } else { Crs::Geographic };
    let layer = read_layer(&args.input, crs)?;

    let figure = ScaleConfig {
        fig_width: args.fig_width,
        margin: args.margin,
        ..Default::default()
    };
    let mut session = Session::new(
        Classifier::default(),
        ClassifyOptions::default(),
        PaletteConfig::default(),
        figure.clone(),
        ConsolidateConfig { scale: figure, ..Default::default() },
    )
    .context("invalid figure settings")?;
    session.classify(&layer).context("classification failed")?;

    if let Some(bbox) = &args.bbox {
        let window = parse_bbox(bbox)?;
        let clipped = session.clip(&window).context("clip failed")?;
        eprintln!("clipped to {} features", clipped.len());
    }

    let scale = session.scale().context("scale computation failed")?;
    eprintln!(
        "scale 1:{} (exact {:.0}, frame {})",
        scale.denominator, scale.exact, scale.frame.strategy
    );

    if args.consolidate {
        let plan = session.consolidate().context("consolidation failed")?;
        eprintln!(
            "consolidated {} of {} small features below {:.1} m² ({} unresolved)",
            plan.assignments.values().map(Vec::len).sum::<usize>(),
            plan.small_count,
            plan.threshold_m2,
            plan.unresolved.len(),
        );
    }

    let (colors, audit) = session.colors().context("color resolution failed")?;
    let legend: BTreeMap<&String, String> =
        colors.iter().map(|(group, c)| (group, c.to_hex())).collect();
    println!("{}", serde_json::to_string_pretty(&legend)?);

    if let Some(path) = &args.audit {
        fs::write(path, serde_json::to_string_pretty(audit)?)
            .with_context(|| format!("writing {path}"))?;
    }
    Ok(())
}
