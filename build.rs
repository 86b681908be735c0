use std::env;
use std::fs;
use std::io::Write;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=templates");

    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("embedded_templates.rs");
    let mut f = fs::File::create(&dest_path).unwrap();

    let mut templates = Vec::new();
    collect_templates(Path::new("templates"), Path::new("templates"), &mut templates);
    // Stable order keeps the generated file identical between builds.
    templates.sort();

    f.write_all(b"pub static TEMPLATES: &[(&str, &str)] = &[\n")
        .unwrap();
    for (key, full_path) in templates {
        let abs_path = fs::canonicalize(&full_path).unwrap();
        f.write_all(
            format!(
                "    ({:?}, include_str!({:?})),\n",
                key,
                abs_path.display().to_string()
            )
            .as_bytes(),
        )
        .unwrap();
    }
    f.write_all(b"];\n").unwrap();
}

fn collect_templates(root: &Path, dir: &Path, templates: &mut Vec<(String, String)>) {
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_templates(root, &path, templates);
            } else {
                // templates/shell/zshrc -> shell/zshrc
                let key = path
                    .strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                templates.push((key, path.to_string_lossy().into_owned()));
            }
        }
    }
}
