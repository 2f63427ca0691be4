//! Mock Kit application for integration testing
//!
//! Behaves like a Kit app on startup: writes the `--/log/file` log, prints
//! progress to stdout and then either reports ready, crashes, hangs or
//! exits depending on `--mode`. With `--pytest` it instead prints a
//! pytest-style session whose verdict depends on the script name.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.first().map(String::as_str) == Some("--pytest") {
        std::process::exit(pytest(&args[1..]));
    }

    let mut mode = "ready".to_string();
    let mut delay_ms = 0u64;
    let mut log_file = None;
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(path) = arg.strip_prefix("--/log/file=") {
            log_file = Some(path.to_string());
        } else if arg == "--mode" {
            mode = iter.next().cloned().unwrap_or_default();
        } else if arg == "--delay-ms" {
            delay_ms = iter.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        }
    }

    let mut log = log_file.and_then(|path| std::fs::File::create(path).ok());
    let mut emit = |line: &str| {
        println!("{}", line);
        std::io::stdout().flush().ok();
        if let Some(log) = log.as_mut() {
            writeln!(log, "{}", line).ok();
            log.flush().ok();
        }
    };

    emit("[Info] [omni.kit.app] Starting mock kit");
    emit("[Warning] [omni.mock] mock extension is deprecated");
    std::thread::sleep(Duration::from_millis(delay_ms));

    match mode.as_str() {
        "ready" => {
            emit("[Info] [omni.kit.app] app ready");
            idle();
        }
        "crash" => {
            emit("[Fatal] [omni.mock] simulated crash");
            std::process::exit(3);
        }
        "hang" => {
            emit("[Info] [omni.kit.app] loading stage");
            idle();
        }
        "exit" => {
            emit("[Info] [omni.kit.app] shutting down");
        }
        other => {
            eprintln!("unknown mode: {}", other);
            std::process::exit(2);
        }
    }
}

fn idle() -> ! {
    loop {
        std::thread::sleep(Duration::from_secs(1));
    }
}

/// Print a pytest session; scripts with "fail" in their name fail
fn pytest(args: &[String]) -> i32 {
    let Some(script) = args.first() else {
        println!("ERROR: file or directory not found");
        return 4;
    };
    let name = Path::new(script)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    println!("============================= test session starts =============================");
    println!("collected 2 items");
    println!();

    let code = if name.contains("empty") {
        println!("============================ no tests ran in 0.01s ============================");
        5
    } else if name.contains("fail") {
        println!("{}::test_open PASSED", name);
        println!("{}::test_save FAILED", name);
        println!("E   AssertionError: stage was not saved");
        println!("==================== 1 failed, 1 passed in 0.05s ====================");
        1
    } else {
        println!("{}::test_open PASSED", name);
        println!("{}::test_save PASSED", name);
        println!("============================== 2 passed in 0.05s ==============================");
        0
    };

    if let Ok(url) = std::env::var("DMF_AUTOMATION_URL") {
        eprintln!("automation endpoint {}", url);
    }
    code
}
