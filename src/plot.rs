//! Chart generation for merged interface rates.

use crate::merge::MergedRow;
use crate::samples::SampleType;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use std::collections::{BTreeMap, HashSet};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// Which sample types get drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSelection {
    pub min: bool,
    pub avg: bool,
    pub max: bool,
}

impl RateSelection {
    pub fn all() -> Self {
        Self {
            min: true,
            avg: true,
            max: true,
        }
    }

    /// An empty selection means everything.
    pub fn normalized(self) -> Self {
        if self.min || self.avg || self.max {
            self
        } else {
            Self::all()
        }
    }

    pub fn includes(&self, sample_type: SampleType) -> bool {
        match sample_type {
            SampleType::Min => self.min,
            SampleType::Avg => self.avg,
            SampleType::Max => self.max,
        }
    }
}

impl Default for RateSelection {
    fn default() -> Self {
        Self::all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn label(&self) -> &'static str {
        match self {
            Direction::In => "octets in",
            Direction::Out => "octets out",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stroke {
    Dotted,
    Solid,
    Dashed,
}

/// Colour per direction, stroke per sample type
pub fn series_style(sample_type: SampleType, direction: Direction) -> (RGBColor, Stroke) {
    let color = match direction {
        Direction::In => GREEN,
        Direction::Out => BLUE,
    };
    let stroke = match sample_type {
        SampleType::Min => Stroke::Dotted,
        SampleType::Avg => Stroke::Solid,
        SampleType::Max => Stroke::Dashed,
    };
    (color, stroke)
}

/// One line on a chart
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesPlan {
    pub sample_type: SampleType,
    pub direction: Direction,
    pub label: String,
    pub points: Vec<(DateTime<Utc>, f64)>,
}

/// Everything needed to draw the chart for one device interface
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPlan {
    pub device: String,
    pub interface: String,
    pub title: String,
    pub series: Vec<SeriesPlan>,
}

impl ChartPlan {
    /// Stem of the SVG name; distinct links may share one after sanitizing.
    pub fn file_stem(&self) -> String {
        format!("{}_{}", sanitize(&self.device), sanitize(&self.interface))
    }
}

/// One SVG name per plan, never repeated.
///
/// A stem already taken gets `-2`, `-3`, ... appended in plan order.
pub fn unique_file_names(plans: &[ChartPlan]) -> Vec<String> {
    let mut used = HashSet::with_capacity(plans.len());
    plans
        .iter()
        .map(|plan| {
            let stem = plan.file_stem();
            let mut name = format!("{}.svg", stem);
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{}-{}.svg", stem, n);
                n += 1;
            }
            name
        })
        .collect()
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Lay out one chart per device and interface, both in sorted order.
///
/// Selected sample types are drawn max, avg, min; each contributes an
/// inbound and an outbound series.
pub fn plan_charts(rows: &[MergedRow], selection: RateSelection) -> Vec<ChartPlan> {
    let mut by_link: BTreeMap<(&str, &str), Vec<&MergedRow>> = BTreeMap::new();
    for row in rows {
        by_link
            .entry((row.device.as_str(), row.interface.as_str()))
            .or_default()
            .push(row);
    }

    by_link
        .into_iter()
        .map(|((device, interface), mut link_rows)| {
            link_rows.sort_by_key(|r| r.time);
            let mut series = Vec::new();
            for sample_type in SampleType::DRAW_ORDER {
                if !selection.includes(sample_type) {
                    continue;
                }
                for direction in [Direction::In, Direction::Out] {
                    let points = link_rows
                        .iter()
                        .filter(|r| r.sample_type == sample_type)
                        .map(|r| {
                            let value = match direction {
                                Direction::In => r.d_octets_in,
                                Direction::Out => r.d_octets_out,
                            };
                            (r.time, value)
                        })
                        .filter(|(_, v)| v.is_finite())
                        .collect();
                    series.push(SeriesPlan {
                        sample_type,
                        direction,
                        label: format!("{} {}", sample_type, direction.label()),
                        points,
                    });
                }
            }
            ChartPlan {
                device: device.to_string(),
                interface: interface.to_string(),
                title: format!("Interface Utilization for {}:{}", device, interface),
                series,
            }
        })
        .collect()
}

/// Render every chart, one at a time, into `output_dir`.
///
/// Prints a `device:interface` line per chart. With `wait` set, blocks on
/// stdin after each chart until the operator dismisses it.
pub fn generate_plots<P: AsRef<Path>>(
    rows: &[MergedRow],
    selection: RateSelection,
    output_dir: P,
    wait: bool,
) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    let plans = plan_charts(rows, selection);
    if plans.is_empty() {
        tracing::info!("No interface data to plot");
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    let names = unique_file_names(&plans);
    let mut generated = Vec::with_capacity(plans.len());
    for (plan, name) in plans.iter().zip(names) {
        println!("{}:{}", plan.device, plan.interface);
        let path = output_dir.join(name);
        render_chart(plan, &path)
            .with_context(|| format!("Failed to render chart: {}", path.display()))?;
        tracing::info!("Wrote {}", path.display());
        generated.push(path);

        if wait {
            wait_for_dismissal(&plan.title)?;
        }
    }
    Ok(generated)
}

fn wait_for_dismissal(title: &str) -> Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "{} - press Enter to continue ", title)?;
    stdout.flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

/// Pick a tick label format suited to the time span shown.
fn suitable_xfmt(span: Duration) -> &'static str {
    if span > Duration::weeks(1) {
        "%y-%m-%d"
    } else if span > Duration::days(1) {
        "%m-%d %H:%M"
    } else {
        "%H:%M:%S"
    }
}

fn time_range(plan: &ChartPlan) -> (DateTime<Utc>, DateTime<Utc>) {
    let mut times = plan.series.iter().flat_map(|s| s.points.iter().map(|p| p.0));
    let first = match times.next() {
        Some(t) => t,
        None => return (DateTime::UNIX_EPOCH, DateTime::UNIX_EPOCH + Duration::hours(1)),
    };
    let (start, end) = times.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t)));
    let margin = if end == start {
        Duration::minutes(1)
    } else {
        (end - start) / 20
    };
    (start - margin, end + margin)
}

/// Draw one chart to an SVG file
pub fn render_chart<P: AsRef<Path>>(plan: &ChartPlan, path: P) -> Result<()> {
    let (x_start, x_end) = time_range(plan);
    let xfmt = suitable_xfmt(x_end - x_start);
    let max_octets = plan
        .series
        .iter()
        .flat_map(|s| s.points.iter().map(|p| p.1))
        .fold(0.0_f64, f64::max)
        .max(1.0)
        * 1.1;

    let root = SVGBackend::new(path.as_ref(), (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&plan.title, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(80)
        .build_cartesian_2d(x_start..x_end, 0f64..max_octets)?;

    chart
        .configure_mesh()
        .x_labels(10)
        .x_label_formatter(&|x: &DateTime<Utc>| x.format(xfmt).to_string())
        .x_desc(format!("time [{}]", xfmt.replace('%', "")))
        .y_desc("octets")
        .draw()?;

    for series in &plan.series {
        let (color, stroke) = series_style(series.sample_type, series.direction);
        let style = color.stroke_width(2);
        let points = series.points.iter().copied();
        let anno = match stroke {
            Stroke::Solid => chart.draw_series(LineSeries::new(points, style))?,
            Stroke::Dashed => chart.draw_series(DashedLineSeries::new(points, 10, 6, style))?,
            Stroke::Dotted => chart.draw_series(DashedLineSeries::new(points, 2, 4, style))?,
        };
        anno.label(series.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()?;

    root.present()?;
    Ok(())
}
