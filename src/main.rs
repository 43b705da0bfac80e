// GUI-subsystem binary: no console window is ever allocated by Windows.
// In CLI mode (--input/-i present) we attach to the launching terminal and
// reopen CONOUT$ so println!/eprintln! reach it.
#![windows_subsystem = "windows"]

use dewatermark::app::DewatermarkApp;
use dewatermark::{cli, logger};
use eframe::egui;

fn main() -> Result<(), eframe::Error> {
    #[cfg(target_os = "windows")]
    if cli::CliArgs::is_cli_mode() {
        attach_parent_console();
    }

    // -- CLI / headless mode ---------------------------------------------
    if cli::CliArgs::is_cli_mode() {
        use clap::Parser;
        logger::init();
        let args = cli::CliArgs::parse();
        let code = cli::run(args);
        std::process::exit(if code == std::process::ExitCode::SUCCESS {
            0
        } else {
            1
        });
    }

    // -- GUI mode -----------------------------------------------------
    logger::init();

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([640.0, 420.0])
            .with_drag_and_drop(true)
            .with_title("Dewatermark"),
        ..Default::default()
    };

    eframe::run_native(
        "Dewatermark",
        options,
        Box::new(|cc| Box::new(DewatermarkApp::new(cc))),
    )
}

/// Attach to the terminal that launched us and point stdout/stderr at it.
#[cfg(target_os = "windows")]
fn attach_parent_console() {
    unsafe extern "system" {
        fn AttachConsole(dwProcessId: u32) -> i32;
        fn SetStdHandle(nStdHandle: u32, hHandle: isize) -> i32;
        fn CreateFileW(
            lpFileName: *const u16,
            dwDesiredAccess: u32,
            dwShareMode: u32,
            lpSecurityAttributes: *const std::ffi::c_void,
            dwCreationDisposition: u32,
            dwFlagsAndAttributes: u32,
            hTemplateFile: isize,
        ) -> isize;
    }
    const ATTACH_PARENT_PROCESS: u32 = 0xFFFF_FFFF;
    const GENERIC_WRITE: u32 = 0x4000_0000;
    const FILE_SHARE_READ_WRITE: u32 = 0x0000_0003;
    const OPEN_EXISTING: u32 = 3;
    const STD_OUTPUT_HANDLE: u32 = 0xFFFF_FFF5_u32;
    const STD_ERROR_HANDLE: u32 = 0xFFFF_FFF4_u32;

    let conout: Vec<u16> = "CONOUT$\0".encode_utf16().collect();
    unsafe {
        if AttachConsole(ATTACH_PARENT_PROCESS) == 0 {
            return;
        }
        let handle = CreateFileW(
            conout.as_ptr(),
            GENERIC_WRITE,
            FILE_SHARE_READ_WRITE,
            std::ptr::null(),
            OPEN_EXISTING,
            0,
            0,
        );
        if handle != -1 {
            SetStdHandle(STD_OUTPUT_HANDLE, handle);
            SetStdHandle(STD_ERROR_HANDLE, handle);
        }
    }
}
