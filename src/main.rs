use snes_hdpack::codec::write_png;
use snes_hdpack::host::{demo_snapshot, render_frame, SCREEN_HEIGHT, SCREEN_WIDTH};
use snes_hdpack::manifest::{parse_line, ManifestLine};
use snes_hdpack::{ContentPaths, HdConfig, HdEngine, LoadStatus, ManifestStore, PpuSnapshot};
use std::env;
use std::path::{Path, PathBuf};
use std::process;

const USAGE: &str = "Usage:
  hdpack run <snapshot> [--pack DIR] [--dump DIR] [--frames N] [--config FILE] [--out PNG] [--dump-tiles] [--hd]
  hdpack check <manifest.txt>
  hdpack demo <snapshot-out>";

struct RunArgs {
    snapshot: PathBuf,
    pack: Option<PathBuf>,
    dump: Option<PathBuf>,
    frames: u32,
    config: Option<PathBuf>,
    out: Option<PathBuf>,
    dump_tiles: bool,
    use_hd_pack: bool,
}

fn usage_error(msg: &str) -> ! {
    eprintln!("{}", msg);
    eprintln!("{}", USAGE);
    process::exit(2);
}

fn value_of(args: &[String], i: usize, flag: &str) -> String {
    match args.get(i + 1) {
        Some(v) => v.clone(),
        None => usage_error(&format!("{} requires a value", flag)),
    }
}

fn parse_run_args(args: &[String]) -> RunArgs {
    let mut run = RunArgs {
        snapshot: PathBuf::new(),
        pack: None,
        dump: None,
        frames: 1,
        config: None,
        out: None,
        dump_tiles: false,
        use_hd_pack: false,
    };
    let mut snapshot: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--pack" => {
                run.pack = Some(PathBuf::from(value_of(args, i, "--pack")));
                i += 2;
            }
            "--dump" => {
                run.dump = Some(PathBuf::from(value_of(args, i, "--dump")));
                i += 2;
            }
            "--frames" => {
                let v = value_of(args, i, "--frames");
                run.frames = match v.parse::<u32>() {
                    Ok(n) if n > 0 => n,
                    _ => usage_error(&format!("--frames: invalid count '{}'", v)),
                };
                i += 2;
            }
            "--config" => {
                run.config = Some(PathBuf::from(value_of(args, i, "--config")));
                i += 2;
            }
            "--out" => {
                run.out = Some(PathBuf::from(value_of(args, i, "--out")));
                i += 2;
            }
            "--dump-tiles" => {
                run.dump_tiles = true;
                i += 1;
            }
            "--hd" => {
                run.use_hd_pack = true;
                i += 1;
            }
            s if s.starts_with('-') => usage_error(&format!("Unknown option: {}", s)),
            s => {
                if snapshot.is_some() {
                    usage_error(&format!("Unexpected argument: {}", s));
                }
                snapshot = Some(PathBuf::from(s));
                i += 1;
            }
        }
    }
    match snapshot {
        Some(p) => run.snapshot = p,
        None => usage_error("Snapshot argument missing"),
    }
    run
}

fn build_config(run: &RunArgs) -> Result<HdConfig, String> {
    let mut config = match &run.config {
        Some(path) => HdConfig::load_from_file(path)?,
        None => HdConfig::default(),
    };
    config.apply_env();
    if run.dump_tiles {
        config.dump_tiles = true;
    }
    if run.use_hd_pack {
        config.use_hd_pack = true;
    }
    Ok(config)
}

fn content_paths(run: &RunArgs) -> Result<ContentPaths, String> {
    let root = env::current_dir().map_err(|e| format!("Failed to read working directory: {}", e))?;
    let mut paths = ContentPaths::for_rom(&root, &run.snapshot);
    if let Some(pack) = &run.pack {
        paths.pack_dir = pack.clone();
        // dumps follow an explicit pack unless told otherwise
        paths.dump_dir = pack.clone();
    }
    if let Some(dump) = &run.dump {
        paths.dump_dir = dump.clone();
    }
    Ok(paths)
}

fn cmd_run(args: &[String]) -> Result<(), String> {
    let run = parse_run_args(args);
    let config = build_config(&run)?;
    let snapshot = PpuSnapshot::load_from_file(&run.snapshot)
        .map_err(|e| format!("Failed to load snapshot {}: {}", run.snapshot.display(), e))?;
    let paths = content_paths(&run)?;

    let mut engine = HdEngine::new(config);
    match engine.load_content(paths.clone()) {
        LoadStatus::Available(n) => println!("HD pack: {} ({} mappings)", paths.pack_dir.display(), n),
        _ if engine.replacement_enabled() => println!("HD pack: none in {}", paths.pack_dir.display()),
        _ => {}
    }

    let mut last = None;
    for _ in 0..run.frames {
        last = Some(render_frame(&snapshot, &mut engine));
    }
    if let Some(frame) = &last {
        let s = frame.stats;
        println!(
            "Frame {}: {} tiles, {} replaced, {} pending, {} HD pixels",
            run.frames, s.tiles, s.replaced, s.pending, s.hd_pixels
        );
    }

    if let (Some(out), Some(frame)) = (&run.out, &last) {
        write_png(out, &frame.pixels, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32, SCREEN_WIDTH as u32)
            .map_err(|e| format!("Failed to write {}: {}", out.display(), e))?;
        println!("Frame written to: {}", out.display());
    }

    let report = engine.unload()?;
    if !report.is_empty() {
        println!(
            "Dumped {} tile(s) into {} sheet(s), {} layer(s) under {}",
            report.tiles,
            report.sheets.len(),
            report.layers.len(),
            paths.dump_dir.display()
        );
    }
    Ok(())
}

fn cmd_check(args: &[String]) -> Result<(), String> {
    let [path] = args else {
        usage_error("check takes exactly one manifest path");
    };
    let path = Path::new(path);
    let text = std::fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    for (n, line) in text.lines().enumerate() {
        match parse_line(line) {
            ManifestLine::Malformed(why) => println!("{}:{}: malformed: {}", path.display(), n + 1, why),
            ManifestLine::Unsupported { hash, version } => {
                println!("{}:{}: {:08X} needs version {}", path.display(), n + 1, hash, version)
            }
            _ => {}
        }
    }

    let mut store = ManifestStore::new();
    let status = store.load(&text);
    let s = store.stats();
    println!(
        "{}: {} mappings, {} sheets, {} malformed, {} unsupported, {} duplicates, {} unknown tokens",
        path.display(),
        s.mappings,
        s.sheets,
        s.malformed,
        s.unsupported,
        s.duplicates,
        s.unknown_tokens
    );
    if status == LoadStatus::NotAvailable {
        return Err("Manifest has no usable mappings".to_string());
    }
    Ok(())
}

fn cmd_demo(args: &[String]) -> Result<(), String> {
    let [out] = args else {
        usage_error("demo takes exactly one output path");
    };
    demo_snapshot()
        .save_to_file(Path::new(out))
        .map_err(|e| format!("Failed to write snapshot {}: {}", out, e))?;
    println!("Demo snapshot written to: {}", out);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.iter().any(|a| a == "--help" || a == "-h") {
        eprintln!("{}", USAGE);
        process::exit(if args.len() < 2 { 2 } else { 0 });
    }

    let rest = &args[2..];
    let result = match args[1].as_str() {
        "run" => cmd_run(rest),
        "check" => cmd_check(rest),
        "demo" => cmd_demo(rest),
        other => usage_error(&format!("Unknown command: {}", other)),
    };
    if let Err(e) = result {
        eprintln!("{}", e);
        process::exit(1);
    }
}
