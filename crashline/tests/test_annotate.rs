use std::fs;
use std::io::Write;

use similar_asserts::assert_eq;

use crashline::common::ByteView;
use crashline::pdb::Pdb;
use crashline::{AnchorConfig, AnnotateError, Annotator, FallbackAnchor, ReportError};
use crashline_testutils::{fixture, PdbBuilder};

type Error = Box<dyn std::error::Error>;

fn game_pdb() -> Vec<u8> {
    PdbBuilder::new()
        .module("main.obj")
        .contribution(0x1000, 0x400)
        .function("Main", "src\\main.cpp", 0x1100, 0x40, &[(0, 20), (8, 21)])
        .function("Game::Run", "src\\game.cpp", 0x1140, 0x40, &[(0, 40), (8, 42)])
        .function(
            "Game::Update",
            "src\\game.cpp",
            0x1200,
            0x80,
            &[(0, 60), (0x18, 64)],
        )
        .module("platform.obj")
        .contribution(0x2000, 0x200)
        .function(
            "Platform::StackTrace",
            "src\\platform\\windows.cpp",
            0x2000,
            0x200,
            &[(0, 10), (0x140, 17)],
        )
        .module_without_stream("* Linker *")
        .contribution(0x3000, 0x20)
        .build()
}

fn anchors() -> AnchorConfig {
    AnchorConfig::default().with_fallback(FallbackAnchor::new(
        "98.2.365 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS",
        "e371d63",
        0x146,
    ))
}

fn pdb_file() -> Result<tempfile::NamedTempFile, Error> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(&game_pdb())?;
    file.flush()?;
    Ok(file)
}

#[test]
fn test_main_anchor() -> Result<(), Error> {
    let report = fs::read_to_string(fixture("reports/main_anchor.txt"))?;
    let file = pdb_file()?;

    let annotated = Annotator::new(anchors()).annotate(&report, ByteView::open(file.path())?)?;

    insta::assert_snapshot!(annotated, @r###"
    Crash report
    Version: 99.1.12 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS
    Tag: 4c0ffee
    Main is at 0x7ff7c2a41100: build started
    Unhandled exception 0xC0000005 (access violation) reading 0x0000000000000010
    Stack trace:
     - Game::Update @ src\game.cpp:64 [0x7ff7c2a41218]
     - Game::Run @ src\game.cpp:42 [0x7ff7c2a41148]
     - Main @ src\main.cpp:21 [0x7ff7c2a41108]
     - kernel32.dll [0x7ffd13f27344]
    "###);
    Ok(())
}

#[test]
fn test_fallback_anchor() -> Result<(), Error> {
    let report = fs::read_to_string(fixture("reports/fallback_anchor.txt"))?;

    let annotated = Annotator::new(anchors()).annotate(&report, game_pdb())?;

    insta::assert_snapshot!(annotated, @r###"
    Crash report
    Version: 98.2.365 X86_64-WINDOWS-MSVC LUACONSOLE HTTPS
    Tag: e371d63
    Unhandled exception 0xC0000005 (access violation) reading 0x0000000000000010
    Stack trace:
     - Platform::StackTrace @ src\platform\windows.cpp:17 [0x7ff7c2a42146]
     - Game::Update @ src\game.cpp:64 [0x7ff7c2a41218]
     - Game::Run @ src\game.cpp:42 [0x7ff7c2a41148]
     - Main @ src\main.cpp:21 [0x7ff7c2a41108]
    "###);
    Ok(())
}

#[test]
fn test_fallback_requires_config() -> Result<(), Error> {
    let report = fs::read_to_string(fixture("reports/fallback_anchor.txt"))?;
    let err = Annotator::default()
        .annotate(&report, game_pdb())
        .unwrap_err();
    assert!(matches!(err, AnnotateError::Report(ReportError::MissingAnchor)));
    Ok(())
}

#[test]
fn test_no_anchor() -> Result<(), Error> {
    let report = fs::read_to_string(fixture("reports/no_anchor.txt"))?;
    let err = Annotator::new(anchors())
        .annotate(&report, game_pdb())
        .unwrap_err();
    assert_eq!(err.to_string(), "failed to process crash report");
    assert!(matches!(err, AnnotateError::Report(ReportError::MissingAnchor)));
    Ok(())
}

#[test]
fn test_forced_anchor() -> Result<(), Error> {
    let report = fs::read_to_string(fixture("reports/no_anchor.txt"))?;
    let annotated = Annotator::default()
        .with_anchor(0x7ff7_c2a4_1100)
        .annotate(&report, game_pdb())?;
    assert!(annotated.contains(" - Game::Update @ src\\game.cpp:64 [0x7ff7c2a41218]"));
    Ok(())
}

#[test]
fn test_annotate_with_open_pdb() -> Result<(), Error> {
    let pdb = Pdb::open(game_pdb())?;
    let annotator = Annotator::default();

    let first = annotator.annotate_with("Main is at 0x1100:\n- Main [0x1100]\n", &pdb)?;
    assert_eq!(first, "Main is at 0x1100:\n- Main @ src\\main.cpp:20 [0x1100]\n");

    // a different anchor against the same PDB
    let second = annotator.annotate_with("Main is at 0x401100:\n- Run [0x401150]\n", &pdb)?;
    assert_eq!(second, "Main is at 0x401100:\n- Run @ src\\game.cpp:42 [0x401150]\n");

    // frames in the linker module have no line information
    let third = annotator.annotate_with("Main is at 0x1100:\n- thunk [0x3004]\n", &pdb)?;
    assert_eq!(third, "Main is at 0x1100:\n- thunk [0x3004]\n");
    Ok(())
}
