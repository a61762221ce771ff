//! ESRI ASCII grids (`.asc`): the six-line header followed by rows of
//! values, north row first.

use mpgrains::{
    GridGeometry,
    Raster,
};
use std::fs::File;
use std::io::{
    BufRead,
    BufReader,
    BufWriter,
    Read,
    Write,
};
use std::path::Path;
use tracing::{
    debug,
    info,
};

use crate::error::CliError;

/// Value written for cells outside every patch or component.
pub const NODATA: u32 = 0;

#[derive(Debug, Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    xll: Option<f64>,
    yll: Option<f64>,
    centered: bool,
    cellsize: Option<f64>,
    nodata: Option<f64>,
}

fn malformed(path: &str, msg: impl Into<String>) -> CliError {
    CliError::RasterFormat {
        path: path.to_string(),
        msg: msg.into(),
    }
}

/// Reads a categorical grid. No-data cells become `None`.
pub fn read_ascii_grid(path: &Path) -> Result<Raster<Option<i32>>, CliError> {
    info!("Reading land-cover grid from {}", path.display());
    let file = File::open(path)?;
    parse_ascii_grid(file, &path.display().to_string())
}

pub fn parse_ascii_grid<R: Read>(reader: R, name: &str) -> Result<Raster<Option<i32>>, CliError> {
    let mut header = Header::default();
    let mut tokens: Vec<String> = Vec::new();

    for line in BufReader::new(reader).lines() {
        let line = line?;
        let mut fields = line.split_whitespace();
        let Some(first) = fields.next() else {
            continue;
        };
        if tokens.is_empty() && first.starts_with(|c: char| c.is_ascii_alphabetic()) {
            let value = fields
                .next()
                .ok_or_else(|| malformed(name, format!("header `{}` has no value", first)))?;
            let number = |v: &str| {
                v.parse::<f64>()
                    .map_err(|_| malformed(name, format!("bad value `{}` for `{}`", v, first)))
            };
            match first.to_ascii_lowercase().as_str() {
                "ncols" => header.ncols = Some(number(value)? as usize),
                "nrows" => header.nrows = Some(number(value)? as usize),
                "xllcorner" => header.xll = Some(number(value)?),
                "yllcorner" => header.yll = Some(number(value)?),
                "xllcenter" => {
                    header.xll = Some(number(value)?);
                    header.centered = true;
                }
                "yllcenter" => {
                    header.yll = Some(number(value)?);
                    header.centered = true;
                }
                "cellsize" => header.cellsize = Some(number(value)?),
                "nodata_value" => header.nodata = Some(number(value)?),
                other => return Err(malformed(name, format!("unknown header `{}`", other))),
            }
            continue;
        }
        tokens.push(first.to_string());
        tokens.extend(fields.map(str::to_string));
    }

    let ncols = header.ncols.ok_or_else(|| malformed(name, "missing ncols"))?;
    let nrows = header.nrows.ok_or_else(|| malformed(name, "missing nrows"))?;
    let cellsize = header.cellsize.ok_or_else(|| malformed(name, "missing cellsize"))?;
    let (mut xll, mut yll) = (header.xll.unwrap_or(0.0), header.yll.unwrap_or(0.0));
    if header.centered {
        xll -= cellsize / 2.0;
        yll -= cellsize / 2.0;
    }
    let n_cells = ncols
        .checked_mul(nrows)
        .ok_or_else(|| malformed(name, format!("{} x {} cells is too large", ncols, nrows)))?;
    if tokens.len() != n_cells {
        return Err(malformed(
            name,
            format!("expected {} values, found {}", n_cells, tokens.len()),
        ));
    }

    let mut values = Vec::with_capacity(tokens.len());
    for token in &tokens {
        let value: f64 = token
            .parse()
            .map_err(|_| malformed(name, format!("bad cell value `{}`", token)))?;
        if header.nodata == Some(value) {
            values.push(None);
        } else if value.fract() == 0.0 && value.abs() <= i32::MAX as f64 {
            values.push(Some(value as i32));
        } else {
            return Err(malformed(
                name,
                format!("land-cover classes must be integers, found `{}`", token),
            ));
        }
    }

    let geometry = GridGeometry::new(ncols, nrows, cellsize).with_origin(xll, yll);
    debug!("Parsed {}x{} grid, cellsize {}", ncols, nrows, cellsize);
    Ok(Raster::new(geometry, values)?)
}

/// Writes a patch or component raster, [`NODATA`] marking empty cells.
pub fn write_ascii_grid<W: Write>(raster: &Raster<u32>, writer: W) -> Result<(), CliError> {
    let geometry = raster.geometry();
    let mut out = BufWriter::new(writer);
    writeln!(out, "ncols {}", geometry.width)?;
    writeln!(out, "nrows {}", geometry.height)?;
    writeln!(out, "xllcorner {}", geometry.origin_x)?;
    writeln!(out, "yllcorner {}", geometry.origin_y)?;
    writeln!(out, "cellsize {}", geometry.resolution)?;
    writeln!(out, "NODATA_value {}", NODATA)?;
    for row in raster.values().chunks(geometry.width.max(1)) {
        let line: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", line.join(" "))?;
    }
    out.flush()?;
    Ok(())
}

pub fn write_ascii_grid_file(raster: &Raster<u32>, path: &Path) -> Result<(), CliError> {
    write_ascii_grid(raster, File::create(path)?)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "ncols 3
nrows 2
xllcorner 100.0
yllcorner 200.0
cellsize 30
NODATA_value -9999
1 2 -9999
3 3 1
";

    #[test]
    fn test_parse_sample_grid() {
        let raster = parse_ascii_grid(SAMPLE.as_bytes(), "sample").unwrap();
        assert_eq!(raster.width(), 3);
        assert_eq!(raster.height(), 2);
        assert_eq!(
            raster.values(),
            &[Some(1), Some(2), None, Some(3), Some(3), Some(1)]
        );
        let geometry = raster.geometry();
        assert_eq!(geometry.resolution, 30.0);
        assert_eq!(geometry.origin_x, 100.0);
        assert_eq!(geometry.origin_y, 200.0);
    }

    #[test]
    fn test_centered_origin_is_shifted() {
        let text = SAMPLE
            .replace("xllcorner", "xllcenter")
            .replace("yllcorner", "yllcenter");
        let raster = parse_ascii_grid(text.as_bytes(), "sample").unwrap();
        assert_eq!(raster.geometry().origin_x, 85.0);
        assert_eq!(raster.geometry().origin_y, 185.0);
    }

    #[test]
    fn test_wrong_value_count() {
        let text = SAMPLE.replace("3 3 1", "3 3");
        let err = parse_ascii_grid(text.as_bytes(), "sample").unwrap_err();
        assert!(matches!(err, CliError::RasterFormat { .. }));
    }

    #[test]
    fn test_oversized_header_rejected() {
        let text = SAMPLE
            .replace("ncols 3", "ncols 4294967296")
            .replace("nrows 2", "nrows 4294967296");
        let err = parse_ascii_grid(text.as_bytes(), "sample").unwrap_err();
        match err {
            CliError::RasterFormat { msg, .. } => assert!(msg.contains("too large"), "{}", msg),
            other => panic!("Expected RasterFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_fractional_class_rejected() {
        let text = SAMPLE.replace("3 3 1", "3 3.5 1");
        assert!(parse_ascii_grid(text.as_bytes(), "sample").is_err());
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patches.asc");
        let geometry = GridGeometry::new(2, 2, 10.0).with_origin(5.0, 7.0);
        let raster = Raster::new(geometry, vec![1u32, 0, 2, 2]).unwrap();
        write_ascii_grid_file(&raster, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ncols 2\nnrows 2\nxllcorner 5\nyllcorner 7\ncellsize 10\nNODATA_value 0\n"));
        let back = read_ascii_grid(&path).unwrap();
        assert_eq!(back.values(), &[Some(1), None, Some(2), Some(2)]);
        assert_eq!(back.geometry(), &geometry);
    }
}
