//! # phototrail
//!
//! Turns a batch of geotagged photos into day albums and a chronological map track.
//!
//! Each uploaded file is read for GPS coordinates and a capture time. Photos
//! with both become points on a single time-ordered track; everything else is
//! reported as skipped with a reason. Points are grouped into one album per
//! calendar day, and a map surface is kept in step with the track and the
//! currently selected photo.
//!
//! ## Features
//!
//! - Concurrent EXIF extraction with per-file failure isolation
//! - Day albums in the viewer's time zone
//! - Map synchronization with deferred construction and full marker rebuilds
//! - Shared day/photo selection between the album list and the map
//! - Last-write-wins uploads: results of superseded batches are dropped
//! - Headless rendering to GeoJSON

// Export modules for integration testing
pub mod config;
pub mod exif;
pub mod extract;
pub mod grouping;
pub mod headless;
pub mod mock;
pub mod photo;
pub mod preview;
pub mod report;
pub mod selection;
pub mod session;
pub mod surface;
pub mod sync;
pub mod timeline;

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use exif::experimental::Writer;
    use exif::{Field, In, Rational, Tag, Value};
    use predicates::prelude::*;
    use std::error::Error;
    use std::fs;
    use std::io::Cursor;
    use std::path::Path;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn cargo_bin() -> Command {
        let cargo = StdCommand::new(env!("CARGO"))
            .arg("build")
            .output()
            .expect("Failed to build binary");

        assert!(cargo.status.success(), "Failed to build phototrail");

        Command::cargo_bin("phototrail").expect("Failed to find phototrail binary")
    }

    fn ascii(tag: Tag, text: &str) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Ascii(vec![text.as_bytes().to_vec()]),
        }
    }

    fn degrees(tag: Tag, value: u32) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value: Value::Rational(vec![
                Rational::from((value, 1)),
                Rational::from((0, 1)),
                Rational::from((0, 1)),
            ]),
        }
    }

    /// Writes a TIFF carrying a capture time and a position
    fn write_photo(path: &Path, taken: &str, lat: u32, lon: u32) -> Result<(), Box<dyn Error>> {
        let fields = [
            ascii(Tag::DateTimeOriginal, taken),
            ascii(Tag::OffsetTimeOriginal, "+00:00"),
            degrees(Tag::GPSLatitude, lat),
            ascii(Tag::GPSLatitudeRef, "N"),
            degrees(Tag::GPSLongitude, lon),
            ascii(Tag::GPSLongitudeRef, "E"),
        ];

        let mut writer = Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        let mut buf = Cursor::new(Vec::new());
        writer.write(&mut buf, false)?;
        fs::write(path, buf.into_inner())?;
        Ok(())
    }

    #[test]
    fn test_config_generation() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("phototrail.yaml");

        let mut cmd = cargo_bin();
        cmd.arg("init")
            .current_dir(temp_dir.path())
            .assert()
            .success();

        assert!(config_path.exists(), "Config file should be created");

        let content = fs::read_to_string(&config_path)?;
        assert!(content.contains("concurrency"), "Config should contain concurrency");
        assert!(content.contains("tile_url"), "Config should contain tile_url");
        assert!(
            content.contains("layout_retry_limit"),
            "Config should contain layout_retry_limit"
        );

        Ok(())
    }

    #[test]
    fn test_init_command_with_force() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("phototrail.yaml");

        let initial_content = "concurrency: 1";
        fs::write(&config_path, initial_content)?;

        // Without --force the file is left alone
        let mut cmd = cargo_bin();
        let output = cmd
            .arg("init")
            .current_dir(temp_dir.path())
            .assert()
            .success();

        let stdout = String::from_utf8(output.get_output().stdout.clone())?;
        assert!(
            stdout.contains("Config file already exists"),
            "Should detect existing config"
        );
        assert_eq!(fs::read_to_string(&config_path)?, initial_content);

        let mut cmd = cargo_bin();
        cmd.arg("init")
            .arg("--force")
            .current_dir(temp_dir.path())
            .assert()
            .success();

        let new_content = fs::read_to_string(&config_path)?;
        assert_ne!(new_content, initial_content);
        assert!(new_content.contains("overlay_file"));

        Ok(())
    }

    #[test]
    fn test_init_with_custom_config_path() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let custom_path = temp_dir.path().join("custom_config.yaml");

        let mut cmd = cargo_bin();
        cmd.arg("init")
            .arg("--config")
            .arg(&custom_path)
            .assert()
            .success();

        assert!(custom_path.exists(), "Custom config file should be created");

        Ok(())
    }

    #[test]
    fn test_scan_reports_days_and_skips() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let first = temp_dir.path().join("first.tif");
        let second = temp_dir.path().join("second.tif");
        let broken = temp_dir.path().join("broken.jpg");
        write_photo(&first, "2024:06:01 12:00:00", 48, 2)?;
        write_photo(&second, "2024:06:04 12:00:00", 51, 0)?;
        fs::write(&broken, b"not an image")?;

        let mut cmd = cargo_bin();
        let output = cmd
            .arg("scan")
            .arg(&second)
            .arg(&broken)
            .arg(&first)
            .current_dir(temp_dir.path())
            .assert()
            .success();

        let stdout = String::from_utf8(output.get_output().stdout.clone())?;
        assert!(stdout.contains("accepted: 2"), "Should accept both photos");
        assert!(stdout.contains("skipped: 1"), "Should skip the broken file");
        assert!(stdout.contains("unreadable"), "Should give the skip reason");

        let first_pos = stdout.find("first.tif").expect("first photo listed");
        let second_pos = stdout.find("second.tif").expect("second photo listed");
        assert!(first_pos < second_pos, "Photos should be listed in capture order");

        Ok(())
    }

    #[test]
    fn test_scan_json_output() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let photo = temp_dir.path().join("photo.tif");
        write_photo(&photo, "2024:06:01 12:00:00", 48, 2)?;

        let mut cmd = cargo_bin();
        let output = cmd
            .arg("scan")
            .arg("--json")
            .arg(&photo)
            .current_dir(temp_dir.path())
            .assert()
            .success();

        let report: serde_json::Value = serde_json::from_slice(&output.get_output().stdout)?;
        assert_eq!(report["accepted"], 1);
        assert_eq!(report["days"][0]["count"], "1 Photo");

        Ok(())
    }

    #[test]
    fn test_map_writes_geojson() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let first = temp_dir.path().join("first.tif");
        let second = temp_dir.path().join("second.tif");
        write_photo(&first, "2024:06:01 12:00:00", 48, 2)?;
        write_photo(&second, "2024:06:01 13:00:00", 49, 3)?;
        let out = temp_dir.path().join("trail.geojson");

        let mut cmd = cargo_bin();
        cmd.arg("map")
            .arg("--out")
            .arg(&out)
            .arg(&first)
            .arg(&second)
            .current_dir(temp_dir.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote overlay"));

        let geojson: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out)?)?;
        assert_eq!(geojson["type"], "FeatureCollection");

        let features = geojson["features"].as_array().expect("features");
        assert_eq!(features.len(), 3, "Track plus one marker per photo");
        assert_eq!(features[0]["geometry"]["type"], "LineString");
        assert_eq!(features[1]["properties"]["active"], true);
        assert_eq!(features[2]["properties"]["active"], false);

        Ok(())
    }

    #[test]
    fn test_invalid_title_format_error() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let config_path = temp_dir.path().join("phototrail.yaml");
        fs::write(&config_path, "day_title_format: \"%Q %A\"\n")?;

        let mut cmd = cargo_bin();
        cmd.arg("scan")
            .arg("photo.jpg")
            .current_dir(temp_dir.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a valid strftime pattern"));

        Ok(())
    }

    #[test]
    fn test_missing_config_error() -> Result<(), Box<dyn Error>> {
        let temp_dir = TempDir::new()?;
        let nonexistent_path = temp_dir.path().join("does_not_exist.yaml");

        let mut cmd = cargo_bin();
        cmd.arg("scan")
            .arg("--config")
            .arg(&nonexistent_path)
            .arg("photo.jpg")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Config file not found"));

        Ok(())
    }
}
