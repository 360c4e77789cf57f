use std::env;
use std::fs;
use std::path::{Path, PathBuf};

fn main() {
    // Copy reference images and config next to the built binary
    let target_dir = target_dir();
    copy_templates(&target_dir);
    copy_config(&target_dir);
}

/// `OUT_DIR` is `target/<profile>/build/javelin-rig-<hash>/out`; the binary
/// lives three levels up.
fn target_dir() -> PathBuf {
    let out_dir = env::var("OUT_DIR").unwrap();
    Path::new(&out_dir)
        .ancestors()
        .nth(3)
        .expect("Could not find target directory")
        .to_path_buf()
}

/// Copies the templates folder so the executable can find its reference set.
fn copy_templates(target_dir: &Path) {
    let template_src = Path::new("templates");
    if template_src.exists() {
        copy_dir_recursive(template_src, &target_dir.join("templates"));
        println!("cargo:rerun-if-changed=templates/");
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) {
    let _ = fs::create_dir_all(dst);

    if let Ok(entries) = fs::read_dir(src) {
        for entry in entries.flatten() {
            let src_path = entry.path();
            let dst_path = dst.join(entry.file_name());

            if src_path.is_dir() {
                copy_dir_recursive(&src_path, &dst_path);
            } else {
                let _ = fs::copy(&src_path, &dst_path);
            }
        }
    }
}

fn copy_config(target_dir: &Path) {
    let config_src = Path::new("config.json");
    if config_src.exists() {
        let _ = fs::copy(config_src, target_dir.join("config.json"));
        println!("cargo:rerun-if-changed=config.json");
    }
}
