use std::{
    fs,
    path::{Path, PathBuf},
    process::{Command, Output},
};

use stemwerk_worker::{
    io::progress::parse_line, EXIT_INPUT_NOT_FOUND, EXIT_JOB_FAILED, EXIT_MISSING_DEPENDENCY,
    EXIT_OK,
};

fn worker(separator: &Path, args: &[&Path]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stemwerk-worker"))
        .args(args)
        .args(["--device", "cpu"])
        .env("STEMWERK_SEPARATOR", separator)
        .env("RUST_LOG", "debug")
        .output()
        .unwrap()
}

fn write_input(dir: &Path) -> PathBuf {
    let path = dir.join("song.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut w = hound::WavWriter::create(&path, spec).unwrap();
    for _ in 0..800 {
        w.write_sample(0i16).unwrap();
    }
    w.finalize().unwrap();
    path
}

#[cfg(unix)]
fn separator_script(dir: &Path, separation_body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("separator.sh");
    fs::write(
        &script,
        format!(
            "#!/bin/sh\n\
             [ \"$1\" = \"--download_model_only\" ] && exit 0\n\
             {}\n",
            separation_body
        ),
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

fn marker(out: &Path) -> String {
    fs::read_to_string(out.join("done.txt")).unwrap()
}

#[cfg(unix)]
#[test]
fn successful_run_prints_json_last_and_marks_done() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("stems");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("stdout.txt"), "PROGRESS:100:Complete\nstale\n").unwrap();
    fs::write(out.join("done.txt"), "ERROR\n").unwrap();

    let input = write_input(dir.path());
    let script = separator_script(
        dir.path(),
        "echo 'separating' ; touch \"$5/song_(Vocals).wav\" \"$5/song_(Instrumental).wav\"",
    );
    let output = worker(&script, &[input.as_path(), out.as_path()]);

    assert_eq!(output.status.code(), Some(EXIT_OK as i32));
    assert_eq!(marker(&out), "DONE\n");

    let stdout = String::from_utf8(output.stdout).unwrap();
    let last = stdout.lines().last().unwrap();
    let result: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(result["vocals"], out.join("vocals.wav").display().to_string());
    assert_eq!(result["other"], out.join("other.wav").display().to_string());
    assert!(!stdout.contains("separating"), "separator output leaked into stdout");

    let mirror = fs::read_to_string(out.join("stdout.txt")).unwrap();
    assert!(mirror.starts_with("PROGRESS:0:Initializing\n"));
    assert!(!mirror.contains("stale"));
    let pcts: Vec<u8> = mirror.lines().filter_map(parse_line).map(|(p, _)| p).collect();
    assert_eq!(pcts.last(), Some(&100));
    assert!(pcts.windows(2).all(|w| w[0] <= w[1]));

    let progress_on_stdout = stdout.lines().filter(|l| parse_line(l).is_some()).count();
    assert_eq!(progress_on_stdout, pcts.len());
    assert!(out.join("separation_log.txt").exists());
}

#[cfg(unix)]
#[test]
fn failed_separation_exits_with_job_failure() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("stems");
    let input = write_input(dir.path());
    let script = separator_script(dir.path(), "echo 'CUDA out of memory' >&2 ; exit 1");

    let output = worker(&script, &[input.as_path(), out.as_path()]);

    assert_eq!(output.status.code(), Some(EXIT_JOB_FAILED as i32));
    assert_eq!(marker(&out), "ERROR\n");
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.lines().last().map_or(true, |l| parse_line(l).is_some()));
    assert!(!stdout.contains('{'));
}

#[test]
fn missing_input_exits_with_input_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("stems");
    let missing = dir.path().join("nope.wav");

    let output = worker(Path::new("stemwerk-no-such-separator"), &[missing.as_path(), out.as_path()]);

    assert_eq!(output.status.code(), Some(EXIT_INPUT_NOT_FOUND as i32));
    assert_eq!(marker(&out), "ERROR\n");
}

#[test]
fn missing_separator_exits_with_missing_dependency() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("stems");
    let input = write_input(dir.path());

    let output = worker(Path::new("stemwerk-no-such-separator"), &[input.as_path(), out.as_path()]);

    assert_eq!(output.status.code(), Some(EXIT_MISSING_DEPENDENCY as i32));
    assert_eq!(marker(&out), "ERROR\n");
}

#[test]
fn missing_arguments_are_a_usage_error() {
    let output = Command::new(env!("CARGO_BIN_EXE_stemwerk-worker"))
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}
