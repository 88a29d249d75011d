//! Demonstration region `DEMO`.
//!
//! Two sections read local source files from the region directory:
//!
//! * `airports`: an HTML table of aerodromes. Names can be corrected
//!   through the `airport_names` fixture, and the distance to the
//!   `frontier` border is recorded when that border exists.
//! * `services`: a CSV list of ATS services per aerodrome, plus an optional
//!   `notices.txt`. Depends on `airports` because every service must
//!   belong to a known aerodrome.

use std::collections::BTreeMap;

use aip_border::Xy;
use aip_document::Feature;
use aip_parser::{
    Override, ParseContext, ParseError, Patch, PatchSet, SectionDescriptor, SectionParser,
    SectionRegistry,
};
use aip_source::Origin;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;

/// Region code.
pub const REGION: &str = "DEMO";

/// Scope of the demo sections.
pub const SCOPE: &str = "AIP";

/// Registers the demo sections.
pub fn register(registry: &mut SectionRegistry) {
    registry.register(
        REGION,
        SCOPE,
        SectionDescriptor::new("airports", &[], airports).with_patches(airport_patches),
    );
    registry.register(
        REGION,
        SCOPE,
        SectionDescriptor::new("services", &["airports"], services),
    );
}

fn airports() -> Box<dyn SectionParser> {
    Box::new(Airports)
}

fn services() -> Box<dyn SectionParser> {
    Box::new(Services)
}

fn airport_patches() -> PatchSet {
    PatchSet::new().with(Patch::new("Airport", "name", |scope, feature, _| {
        scope
            .resources
            .lookup("airport_names", feature.id())
            .and_then(toml::Value::as_str)
            .map_or(Override::Keep, |name| Override::Replace(name.into()))
    }))
}

/// Local origin for a file in the region's `sources/` directory.
fn local_source(ctx: &ParseContext<'_>, file: &str) -> Result<Origin, ParseError> {
    ctx.resources()
        .source_file(file)
        .map(Origin::local_file)
        .ok_or_else(|| ctx.extraction_error("region has no sources directory"))
}

struct Airports;

#[async_trait(?Send)]
impl SectionParser for Airports {
    async fn parse(&mut self, ctx: &mut ParseContext<'_>) -> Result<(), ParseError> {
        let origin = local_source(ctx, "airports.html")?;
        let page = ctx.read("airports", &origin).await?;
        let html = page
            .as_html()
            .ok_or_else(|| ctx.extraction_error("airports.html is not an HTML page"))?;

        let records = table_records(html).map_err(|e| ctx.extraction_error(e))?;
        log::info!("[airports] {} table rows", records.len());

        for (row, record) in records.iter().enumerate() {
            let field = |name: &str| record.get(name).map_or("", String::as_str);

            let ident = field("ident");
            if ident.is_empty() {
                ctx.warn(format!("row {row}: no ident, skipped"));
                continue;
            }

            let Some(position) = parse_position(field("position")) else {
                ctx.warn(format!("{ident}: bad position {:?}, skipped", field("position")));
                continue;
            };

            let mut airport = Feature::new("Airport", ident);
            ctx.set(&mut airport, "name", Value::from(field("name")));
            ctx.set(&mut airport, "latitude", Value::from(position.lat));
            ctx.set(&mut airport, "longitude", Value::from(position.long));

            if !field("city").is_empty() {
                ctx.set(&mut airport, "city", Value::from(field("city")));
            }

            match parse_elevation(field("elevation")) {
                Some(feet) => ctx.set(&mut airport, "elevation_ft", Value::from(feet)),
                None => ctx.warn(format!("{ident}: bad elevation {:?}", field("elevation"))),
            }

            if let Some(km) = border_distance_km(ctx, position) {
                ctx.set(&mut airport, "border_distance_km", Value::from(km));
            }

            ctx.add(airport);
        }

        Ok(())
    }
}

/// Rows of the first table as header name to cell text.
fn table_records(html: &Html) -> Result<Vec<BTreeMap<String, String>>, String> {
    let table_sel = parse_selector("table")?;
    let header_sel = parse_selector("tr th")?;
    let row_sel = parse_selector("tr")?;
    let cell_sel = parse_selector("td")?;

    let table = html
        .select(&table_sel)
        .next()
        .ok_or("no table found in page")?;

    let headers: Vec<String> = table
        .select(&header_sel)
        .map(|el| el.text().collect::<String>().trim().to_lowercase())
        .collect();
    if headers.is_empty() {
        return Err("no header cells found in table".to_owned());
    }

    Ok(table
        .select(&row_sel)
        .map(|row| {
            row.select(&cell_sel)
                .map(|el| el.text().collect::<String>().trim().to_owned())
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .map(|cells| headers.iter().cloned().zip(cells).collect())
        .collect())
}

fn parse_selector(selector: &str) -> Result<Selector, String> {
    Selector::parse(selector).map_err(|e| format!("invalid CSS selector '{selector}': {e}"))
}

/// Parses `"47.59, 7.53"`.
fn parse_position(text: &str) -> Option<Xy> {
    let (lat, long) = text.split_once(',')?;
    let lat = lat.trim().parse::<f64>().ok()?;
    let long = long.trim().parse::<f64>().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&long))
        .then(|| Xy::new(lat, long))
}

/// Parses `"885 ft"` or `"885"`.
fn parse_elevation(text: &str) -> Option<i64> {
    text.trim()
        .trim_end_matches("ft")
        .trim()
        .parse()
        .ok()
}

fn border_distance_km(ctx: &ParseContext<'_>, position: Xy) -> Option<f64> {
    let border = ctx.border("frontier")?;
    let nearest = border.xy(border.nearest(&position, None)?)?;
    Some((position.distance(&nearest) / 100.0).round() / 10.0)
}

struct Services;

#[async_trait(?Send)]
impl SectionParser for Services {
    async fn parse(&mut self, ctx: &mut ParseContext<'_>) -> Result<(), ParseError> {
        let origin = local_source(ctx, "services.csv")?;
        let table = ctx.read("services", &origin).await?;
        let rows = table
            .as_csv()
            .ok_or_else(|| ctx.extraction_error("services.csv is not a CSV file"))?;

        let Some((header, rows)) = rows.split_first() else {
            return Err(ctx.extraction_error("services.csv is empty"));
        };
        let column = |name: &str| header.iter().position(|h| h.eq_ignore_ascii_case(name));
        let (Some(ident_col), Some(service_col)) = (column("ident"), column("service")) else {
            return Err(ctx.extraction_error("services.csv needs ident and service columns"));
        };
        let frequency_col = column("frequency");

        for row in rows {
            let cell = |i: usize| row.get(i).map_or("", String::as_str);
            let ident = cell(ident_col);
            let service = cell(service_col);

            let known = !ctx
                .document()
                .find_by("Airport", &[("id", Value::from(ident))])
                .is_empty();
            if !known {
                ctx.warn(format!("{service} service for unknown aerodrome {ident:?}, skipped"));
                continue;
            }

            let mut feature = Feature::new("Service", &format!("{ident}-{service}"));
            ctx.set(&mut feature, "airport", Value::from(ident));
            ctx.set(&mut feature, "service", Value::from(service));
            if let Some(col) = frequency_col
                && let Ok(mhz) = cell(col).parse::<f64>()
            {
                ctx.set(&mut feature, "frequency_mhz", Value::from(mhz));
            }
            ctx.add(feature);

            if service == "TWR" {
                ctx.update("Airport", ident, "controlled", Value::Bool(true));
            }
        }

        let notices = local_source(ctx, "notices.txt")?;
        match ctx.read("notices", &notices).await {
            Ok(document) => {
                let text = document.as_text().unwrap_or_default();
                log::info!("[services] {} notice lines", text.lines().count());
            }
            Err(e) if e.is_not_found() => log::info!("[services] no notices published"),
            Err(e) => return Err(e.into()),
        }

        Ok(())
    }
}
