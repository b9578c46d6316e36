//! Usage: `cargo run --example ctf_demo -- [config.toml] [projections.mrcs]`
//!
//! Writes `ctf_image.png`, `orientations.csv` and, when a stack is given,
//! `<stack>_ctf.mrcs` next to the input.

use cryosim::{mrc, normalise_to_u8_range, Config, Orientations};
use image::GrayImage;
use ndarray::ArrayView2;
use std::io;
use std::path::Path;

const PROFILE_FREQUENCIES: [f64; 10] = [
    0.0, 0.0019, 0.0038, 0.0057, 0.0076, 0.4091, 0.4110, 0.4129, 0.4148, 0.4167,
];

fn main() -> cryosim::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let ctf = &config.ctf;

    // 1D CTF values at some points
    for (s, value) in PROFILE_FREQUENCIES
        .iter()
        .zip(ctf.ctf1d(&PROFILE_FREQUENCIES, 0.0)?)
    {
        println!("s: {} CTF value: {}", s, value);
    }

    let ctf_image = ctf.ctf2d()?;
    save_grayscale_png(ctf_image.view(), "ctf_image.png")?;
    println!("saved ctf_image.png ({}x{})", ctf_image.ncols(), ctf_image.nrows());

    if let Some(stack_path) = args.next() {
        let stack_path = Path::new(&stack_path);
        let stack = mrc::read_stack(stack_path)?;
        let degraded = ctf.apply_to_stack(stack.view())?;
        let stem = stack_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("projections");
        let out_path = stack_path.with_file_name(format!("{}_ctf.mrcs", stem));
        mrc::write_stack(&out_path, degraded.view())?;
        println!("saved {}", out_path.display());
    }

    let orientations = config.sampling.sample(config.method)?;
    println!("{} {} orientations", orientations.len(), config.method);
    write_unit_vectors(&orientations, "orientations.csv")?;
    println!("saved orientations.csv");

    Ok(())
}

fn save_grayscale_png(image: ArrayView2<f64>, path: &str) -> io::Result<()> {
    let (h, w) = image.dim();
    let pixels: Vec<u8> = normalise_to_u8_range(image)
        .iter()
        .map(|&v| v.round() as u8)
        .collect();
    let img = GrayImage::from_raw(w as u32, h as u32, pixels)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "CTF image buffer size"))?;
    img.save(path).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
}

fn write_unit_vectors(orientations: &Orientations, path: &str) -> io::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&["x", "y", "z"])?;
    for point in orientations.unit_vectors() {
        writer.serialize((point[0], point[1], point[2]))?;
    }
    writer.flush()
}
