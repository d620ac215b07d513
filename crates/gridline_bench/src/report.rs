//! Rendering of collected benchmark timings.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use comfy_table::{ContentArrangement, Table, presets};

use crate::VariantTimes;

/// Collected variant timings, rendered as a table via `Display`.
#[derive(Debug, Default)]
pub struct Report {
    variants: Vec<VariantTimes>,
}

impl Report {
    pub fn new() -> Report {
        Report::default()
    }

    pub fn push(&mut self, times: VariantTimes) {
        self.variants.push(times);
    }

    pub fn variants(&self) -> &[VariantTimes] {
        &self.variants
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut table = Table::new();
        table.load_preset(presets::ASCII_MARKDOWN);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["variant", "reps", "min_ms", "median_ms", "max_ms"]);

        for times in &self.variants {
            match times.stats() {
                Some(stats) => {
                    table.add_row(vec![
                        times.name.clone(),
                        times.samples.len().to_string(),
                        format_ms(stats.min.as_secs_f64()),
                        format_ms(stats.median.as_secs_f64()),
                        format_ms(stats.max.as_secs_f64()),
                    ]);
                }
                None => {
                    table.add_row(vec![
                        times.name.clone(),
                        "0".to_string(),
                        "-".to_string(),
                        "-".to_string(),
                        "-".to_string(),
                    ]);
                }
            }
        }

        write!(f, "{table}")
    }
}

fn format_ms(secs: f64) -> String {
    format!("{:.3}", secs * 1000.0)
}

/// Appends raw per-repetition samples to a TSV file for later analysis.
#[derive(Debug)]
pub struct TsvWriter {
    file: Option<BufWriter<File>>,
}

impl TsvWriter {
    pub fn try_new(save: Option<PathBuf>) -> io::Result<Self> {
        let file = match save {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(path)?;
                Some(BufWriter::new(file))
            }
            None => None,
        };
        Ok(TsvWriter { file })
    }

    pub fn write_header(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "variant\trep\tduration_micros")?;
        }
        Ok(())
    }

    pub fn write(&mut self, times: &VariantTimes) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            for (idx, sample) in times.samples.iter().enumerate() {
                writeln!(file, "{}\t{}\t{}", times.name, idx + 1, sample.as_micros())?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}
