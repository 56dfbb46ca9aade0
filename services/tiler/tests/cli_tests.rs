//! End-to-end runs through the CLI layer against files on disk.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use clap::Parser;
use test_utils::{
    bbox, create_grid_with_markers, create_pressure_grid, geographic_raster, list_files,
    temp_test_dir, write_test_file, SAMPLE_COLORMAP,
};
use tile_common::{CrsCode, Raster};
use tiler::cli::{self, error_stage, exit_code, resolve_config, Args};
use tiler::TilesetMetadata;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn write_geotiff(dir: &Path, name: &str, raster: &Raster) -> PathBuf {
    let mut buf = Cursor::new(Vec::new());
    tiler::geotiff::encode_float_geotiff(&mut buf, raster).unwrap();
    write_test_file(dir, name, &buf.into_inner())
}

fn europe_pressure(dir: &Path) -> PathBuf {
    let data = create_pressure_grid(60, 37);
    write_geotiff(dir, "input.tif", &geographic_raster(data, 60, 37, bbox::EUROPE, None))
}

fn args(input: &Path, colormap: &Path, out: &Path, extra: &[&str]) -> Args {
    let mut argv: Vec<String> = vec![
        "tiler".into(),
        input.display().to_string(),
        colormap.display().to_string(),
        out.display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    Args::try_parse_from(argv).unwrap()
}

async fn run(args: &Args) -> anyhow::Result<cli::RunSummary> {
    let config = resolve_config(args, |_| None)?;
    cli::run_with_config(args, config).await
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_writes_tile_tree_and_metadata() {
    let dir = temp_test_dir();
    let input = europe_pressure(dir.path());
    let colormap = write_test_file(dir.path(), "ramp.txt", SAMPLE_COLORMAP.as_bytes());
    let out = dir.path().join("tiles");

    let summary = run(&args(&input, &colormap, &out, &["-z", "0-2"])).await.unwrap();

    let files = list_files(&out);
    let pngs: Vec<&String> = files.iter().filter(|f| f.ends_with(".png")).collect();
    assert!(files.contains(&"metadata.json".to_string()));
    assert!(files.contains(&"0/0/0.png".to_string()));
    assert_eq!(pngs.len(), summary.write.tiles_written);
    assert!(summary.write.indexed_tiles >= 1);
    assert!(summary.write.indexed_tiles <= summary.write.tiles_written);
    for png in &pngs {
        let bytes = fs::read(out.join(png)).unwrap();
        assert_eq!(bytes[..8], PNG_SIGNATURE, "{}", png);
    }

    let metadata: TilesetMetadata =
        serde_json::from_slice(&fs::read(out.join("metadata.json")).unwrap()).unwrap();
    assert_eq!((metadata.minzoom, metadata.maxzoom), (0, 2));
    assert_eq!(metadata.tile_size, 256);
    assert_eq!(metadata.total_tiles, pngs.len());
    let [west, south, east, north] = metadata.bounds.unwrap();
    assert!(west <= -15.0 && south <= 35.0 && east >= 45.0 && north >= 72.0);

    // Staging directory is gone
    assert_eq!(entries(dir.path()), vec!["input.tif", "ramp.txt", "tiles"]);
}

#[tokio::test]
async fn test_tms_scheme_flips_rows() {
    let dir = temp_test_dir();
    let input = europe_pressure(dir.path());
    let colormap = write_test_file(dir.path(), "ramp.txt", SAMPLE_COLORMAP.as_bytes());
    let xyz = dir.path().join("xyz");
    let tms = dir.path().join("tms");

    run(&args(&input, &colormap, &xyz, &["-z", "0-1"])).await.unwrap();
    run(&args(&input, &colormap, &tms, &["-z", "0-1", "--scheme", "tms"]))
        .await
        .unwrap();

    let xyz_files = list_files(&xyz);
    let tms_files = list_files(&tms);
    assert!(xyz_files.contains(&"1/0/0.png".to_string()));
    assert!(xyz_files.contains(&"1/1/0.png".to_string()));
    assert!(tms_files.contains(&"1/0/1.png".to_string()));
    assert!(tms_files.contains(&"1/1/1.png".to_string()));
    assert_eq!(
        fs::read(xyz.join("1/0/0.png")).unwrap(),
        fs::read(tms.join("1/0/1.png")).unwrap()
    );
}

#[tokio::test]
async fn test_keep_intermediate_geotiff() {
    let dir = temp_test_dir();
    let input = europe_pressure(dir.path());
    let colormap = write_test_file(dir.path(), "ramp.txt", SAMPLE_COLORMAP.as_bytes());
    let out = dir.path().join("tiles");
    let merc = dir.path().join("mercator.tif");

    let keep = merc.display().to_string();
    run(&args(&input, &colormap, &out, &["-z", "0-1", "--keep-intermediate", &keep]))
        .await
        .unwrap();

    let raster = tiler::geotiff::read_geotiff(&merc).unwrap();
    assert_eq!(raster.band_count(), 4);
    assert_eq!(raster.crs(), Some(CrsCode::Epsg3857));
}

#[tokio::test]
async fn test_rerun_replaces_previous_tree() {
    let dir = temp_test_dir();
    let input = europe_pressure(dir.path());
    let colormap = write_test_file(dir.path(), "ramp.txt", SAMPLE_COLORMAP.as_bytes());
    let out = dir.path().join("tiles");
    fs::create_dir_all(out.join("9/9")).unwrap();
    fs::write(out.join("9/9/9.png"), b"stale").unwrap();

    run(&args(&input, &colormap, &out, &["-z", "0-1"])).await.unwrap();

    assert!(!out.join("9/9/9.png").exists());
    assert!(out.join("0/0/0.png").exists());
    assert_eq!(entries(dir.path()), vec!["input.tif", "ramp.txt", "tiles"]);
}

#[tokio::test]
async fn test_failed_run_keeps_existing_output() {
    let dir = temp_test_dir();
    let data = create_grid_with_markers(8, 4, 1024.0, 1026.0, &[(1, 1)]);
    let input = write_geotiff(
        dir.path(),
        "input.tif",
        &geographic_raster(data, 8, 4, bbox::ARCTIC_CAP, None),
    );
    let colormap = write_test_file(dir.path(), "ramp.txt", SAMPLE_COLORMAP.as_bytes());
    let out = dir.path().join("tiles");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("keep.txt"), b"previous run").unwrap();

    let err = run(&args(&input, &colormap, &out, &[])).await.unwrap_err();

    assert_eq!(exit_code(&err), 1);
    assert_eq!(error_stage(&err), "reproject");
    assert_eq!(list_files(&out), vec!["keep.txt"]);
    assert_eq!(entries(dir.path()), vec!["input.tif", "ramp.txt", "tiles"]);
}

#[tokio::test]
async fn test_missing_colormap_exit_code() {
    let dir = temp_test_dir();
    let input = europe_pressure(dir.path());
    let out = dir.path().join("tiles");

    let err = run(&args(&input, &dir.path().join("nope.txt"), &out, &[]))
        .await
        .unwrap_err();

    assert_eq!(exit_code(&err), 2);
    assert!(!out.exists());
}

#[tokio::test]
async fn test_malformed_colormap_names_line() {
    let dir = temp_test_dir();
    let input = europe_pressure(dir.path());
    let colormap = write_test_file(dir.path(), "ramp.txt", b"1 0 0 255\n128 0 300 0\n");
    let out = dir.path().join("tiles");

    let err = run(&args(&input, &colormap, &out, &[])).await.unwrap_err();

    assert_eq!(exit_code(&err), 2);
    assert_eq!(error_stage(&err), "colormap");
    assert!(format!("{:#}", err).contains("line 2"));
}

#[tokio::test]
async fn test_non_tiff_input_exit_code() {
    let dir = temp_test_dir();
    let input = write_test_file(dir.path(), "input.tif", b"definitely not a tiff");
    let colormap = write_test_file(dir.path(), "ramp.txt", SAMPLE_COLORMAP.as_bytes());

    let err = run(&args(&input, &colormap, &dir.path().join("tiles"), &[]))
        .await
        .unwrap_err();

    assert_eq!(exit_code(&err), 2);
    assert_eq!(error_stage(&err), "input");
}

#[tokio::test]
async fn test_invalid_zoom_exit_code() {
    let dir = temp_test_dir();
    let input = europe_pressure(dir.path());
    let colormap = write_test_file(dir.path(), "ramp.txt", SAMPLE_COLORMAP.as_bytes());
    let a = args(&input, &colormap, &dir.path().join("tiles"), &["-z", "5-2"]);

    let err = resolve_config(&a, |_| None).unwrap_err();
    assert_eq!(exit_code(&err), 2);
    assert_eq!(error_stage(&err), "pyramid");
}
