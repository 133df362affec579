//! Archive builders for unit tests

use flate2::Compression;
use flate2::write::GzEncoder;
use std::path::Path;
use tar::{Builder, Header};

/// Gzipped tar holding `entries`
pub fn tgz_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);
    for (path, content) in entries {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// A minimal packaged chart
pub fn chart_tgz(name: &str, version: &str) -> Vec<u8> {
    let chart_yaml = format!(
        "apiVersion: v2\nname: {}\nversion: {}\ndescription: test chart\n",
        name, version
    );
    tgz_bytes(&[(&format!("{}/Chart.yaml", name), &chart_yaml)])
}

pub fn write_tgz(output: &Path, entries: &[(&str, &str)]) {
    std::fs::write(output, tgz_bytes(entries)).unwrap();
}
