use std::error::Error;
use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn preview_writes_sandboxed_host_page() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    let site = workspace.path().join("site");
    fs::create_dir_all(&site)?;
    fs::write(site.join("index.html"), "<p>hello</p>")?;
    fs::write(site.join("style.css"), "p { color: red; }")?;
    fs::write(site.join("app.js"), "console.log(1);")?;
    fs::write(site.join("notes.txt"), "not composed")?;
    let output = workspace.path().join("preview.html");

    cli()?
        .args([
            "preview",
            site.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("index.html"));

    let page = fs::read_to_string(&output)?;
    assert!(page.contains("sandbox=\"allow-scripts\""));
    assert!(!page.contains("allow-same-origin"));
    assert!(page.contains("&lt;p&gt;hello&lt;/p&gt;"));
    let style = page.find("p { color: red; }").unwrap();
    let body = page.find("&lt;p&gt;hello").unwrap();
    let script = page.find("console.log(1);").unwrap();
    assert!(style < body && body < script);
    assert!(!page.contains("not composed"));
    Ok(())
}

#[test]
fn preview_uses_the_requested_entry() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    fs::write(workspace.path().join("a.html"), "<p>first</p>")?;
    fs::write(workspace.path().join("b.html"), "<p>second</p>")?;
    let output = workspace.path().join("out").join("preview.html");

    cli()?
        .args([
            "preview",
            workspace.path().to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--entry",
            "b.html",
        ])
        .assert()
        .success();

    let page = fs::read_to_string(&output)?;
    assert!(page.contains("second"));
    assert!(!page.contains("first"));
    Ok(())
}

#[test]
fn preview_without_markup_fails() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    fs::write(workspace.path().join("style.css"), "body {}")?;
    let output = workspace.path().join("preview.html");

    cli()?
        .args([
            "preview",
            workspace.path().to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no markup file"));
    assert!(!output.exists());
    Ok(())
}

#[test]
fn empty_markup_gets_boilerplate() -> Result<(), Box<dyn Error>> {
    let workspace = tempdir()?;
    fs::write(workspace.path().join("index.html"), "")?;
    let output = workspace.path().join("preview.html");

    cli()?
        .args([
            "preview",
            workspace.path().to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .assert()
        .success();

    assert!(fs::read_to_string(&output)?.contains("&lt;!DOCTYPE html&gt;"));
    assert_eq!(fs::read_to_string(workspace.path().join("index.html"))?, "");
    Ok(())
}

fn cli() -> Result<Command, Box<dyn Error>> {
    Ok(Command::cargo_bin("livepad")?)
}
