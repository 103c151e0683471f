//! End-to-end runs over small unpacked packages.

use epub2notes::metadata::BookMetadata;
use epub2notes::{
    convert_package, Error, MarkupConverter, NoCitations, PackageStructureError, RunContext,
};
use lazy_static::lazy_static;
use regex::Regex;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

lazy_static! {
    static ref LINK: Regex = Regex::new(r#"(?s)<a [^>]*href="([^"]*)"[^>]*>(.*?)</a>"#).unwrap();
    static ref IMG: Regex = Regex::new(r#"<img src="([^"]*)" alt="([^"]*)"\s*/?>"#).unwrap();
    static ref H1: Regex = Regex::new(r"(?s)<h1[^>]*>(.*?)</h1>").unwrap();
    static ref H2: Regex = Regex::new(r"(?s)<h2[^>]*>(.*?)</h2>").unwrap();
    static ref PARA: Regex = Regex::new(r"(?s)<p[^>]*>(.*?)</p>").unwrap();
    static ref TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
}

/// Just enough HTML to Markdown for the fixtures below. Writes only
/// whitespace for a unit mentioning "Silence".
struct FixtureConverter;

impl MarkupConverter for FixtureConverter {
    fn name(&self) -> &str {
        "fixture"
    }

    fn convert(&self, input: &Path, output: &Path) -> epub2notes::Result<()> {
        let html = fs::read_to_string(input)?;
        if html.contains("Silence") {
            fs::write(output, "\n  \n")?;
            return Ok(());
        }
        let md = LINK.replace_all(&html, "[$2]($1)");
        let md = IMG.replace_all(&md, "![$2]($1)");
        let md = H1.replace_all(&md, "\n# $1\n\n");
        let md = H2.replace_all(&md, "\n## $1\n\n");
        let md = PARA.replace_all(&md, "$1\n\n");
        let md = TAG.replace_all(&md, "");
        fs::write(output, md.as_ref())?;
        Ok(())
    }
}

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:title>Fixture Book</dc:title></metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="preface" href="preface.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1" href="chap1.xhtml" media-type="application/xhtml+xml"/>
    <item id="c1b" href="chap1b.xhtml" media-type="application/xhtml+xml"/>
    <item id="c2" href="chap2.xhtml" media-type="application/xhtml+xml"/>
    <item id="c3" href="silence.xhtml" media-type="application/xhtml+xml"/>
    <item id="lost" href="missing.xhtml" media-type="application/xhtml+xml"/>
    <item id="refs" href="refs.xhtml" media-type="application/xhtml+xml"/>
    <item id="fig" href="Images/fig.png" media-type="image/png"/>
  </manifest>
  <spine>
    <itemref idref="preface"/>
    <itemref idref="c1"/>
    <itemref idref="c1b"/>
    <itemref idref="c2"/>
    <itemref idref="c3"/>
    <itemref idref="lost"/>
    <itemref idref="refs"/>
  </spine>
</package>"#;

const NAV: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body><nav epub:type="toc"><ol>
  <li><a href="preface.xhtml">Preface</a></li>
  <li><a href="chap1.xhtml">Chapter 1 Origins</a><ol><li><a href="chap1b.xhtml">Further Origins</a></li></ol></li>
  <li><a href="chap2.xhtml">Chapter 2 Growth</a></li>
  <li><a href="silence.xhtml">Chapter 3 Silence</a></li>
  <li><a href="refs.xhtml">References</a></li>
</ol></nav></body>
</html>"#;

fn page(body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\"><body>{body}</body></html>"
    )
}

fn write_package(root: &Path) {
    fs::create_dir_all(root.join("META-INF")).unwrap();
    fs::create_dir_all(root.join("OEBPS/Images")).unwrap();
    fs::write(root.join("META-INF/container.xml"), CONTAINER).unwrap();
    fs::write(root.join("OEBPS/content.opf"), OPF).unwrap();
    fs::write(root.join("OEBPS/nav.xhtml"), NAV).unwrap();
    fs::write(root.join("OEBPS/Images/fig.png"), b"png").unwrap();

    let units = [
        (
            "preface.xhtml",
            r#"<section id="preface"><h1>Preface</h1>
<p>Read <a href="chap2.xhtml#s1">the second chapter</a> and <a href="gone.xhtml">a lost part</a>.</p></section>"#,
        ),
        (
            "chap1.xhtml",
            r#"<section id="chapter1"><h1>Chapter 1 Origins</h1>
<p>Back to <a href="preface.xhtml">the preface</a>.</p>
<img src="Images/fig.png" alt="Figure"/></section>"#,
        ),
        (
            "chap1b.xhtml",
            r#"<section id="chapter1_2"><h1>Further Origins</h1>
<p>See <a href="https://example.org/more">the site</a>.</p></section>"#,
        ),
        (
            "chap2.xhtml",
            r#"<section id="chapter2"><h1>Chapter 2 Growth</h1>
<h2 id="s1">Details</h2>
<p>Unlike <a href="silence.xhtml">the quiet chapter</a>, this one has text.</p></section>"#,
        ),
        (
            "silence.xhtml",
            r#"<section id="chapter3"><h1>Chapter 3 Silence</h1><p>Nothing.</p></section>"#,
        ),
        (
            "refs.xhtml",
            r#"<section id="references"><h1>References</h1><p>Works cited.</p></section>"#,
        ),
    ];
    for (name, body) in units {
        fs::write(root.join("OEBPS").join(name), page(body)).unwrap();
    }
}

fn metadata() -> BookMetadata {
    BookMetadata {
        title: Some("Fixture Book".into()),
        ..BookMetadata::default()
    }
}

struct Run {
    _package: TempDir,
    out: TempDir,
    _work: TempDir,
    report: epub2notes::RunReport,
}

fn run_fixture() -> Run {
    let package = TempDir::new().unwrap();
    write_package(package.path());
    let out = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let ctx = RunContext::new(package.path(), out.path(), work.path());
    let report = convert_package(&ctx, &FixtureConverter, &NoCitations, &metadata()).unwrap();
    Run {
        _package: package,
        out,
        _work: work,
        report,
    }
}

fn read(run: &Run, name: &str) -> String {
    fs::read_to_string(run.out.path().join(name)).unwrap()
}

#[test]
fn test_labels_and_file_names() {
    let run = run_fixture();
    for name in [
        "00a - Preface.md",
        "01.0 - Chapter 1 Origins.md",
        "01.1 - Further Origins.md",
        "02.0 - Chapter 2 Growth.md",
        "90 - References.md",
        "README.md",
    ] {
        assert!(run.out.path().join(name).is_file(), "{name} not written");
    }
    assert!(!run.out.path().join("03.0 - Chapter 3 Silence.md").exists());
    assert_eq!(run.report.units_converted, 5);
    assert_eq!(run.report.units_skipped, 2);
}

#[test]
fn test_forward_links_resolve_after_second_pass() {
    let run = run_fixture();
    let preface = read(&run, "00a - Preface.md");
    assert!(preface.contains("[[02.0 - Chapter 2 Growth#s1|the second chapter]]"));
    assert!(preface.contains("and a lost part."));

    let chapter = read(&run, "01.0 - Chapter 1 Origins.md");
    assert!(chapter.contains("Back to [[00a - Preface|the preface]]."));
    assert!(chapter.contains("![Figure](images/fig.png)"));
}

#[test]
fn test_skipped_unit_links_become_text() {
    let run = run_fixture();
    let chapter = read(&run, "02.0 - Chapter 2 Growth.md");
    assert!(chapter.contains("Unlike the quiet chapter, this one"));
    assert!(!chapter.contains("[[03.0"));
    assert!(run.report.warnings.contains("converter produced no output for silence.xhtml"));
    assert!(run.report.warnings.contains("missing.xhtml is missing"));
}

#[test]
fn test_external_links_kept_and_headers_written() {
    let run = run_fixture();
    let part = read(&run, "01.1 - Further Origins.md");
    let header = part
        .strip_prefix("---\n")
        .and_then(|rest| rest.split_once("---\n"))
        .map(|(yaml, _)| yaml)
        .unwrap();
    let header: serde_yaml::Value = serde_yaml::from_str(header).unwrap();
    assert_eq!(header["title"].as_str(), Some("Further Origins"));
    assert_eq!(header["label"].as_str(), Some("01.1"));
    assert_eq!(header["book"].as_str(), Some("Fixture Book"));
    assert!(part.contains("[the site](https://example.org/more)"));
    assert!(part.ends_with('\n') && !part.ends_with("\n\n"));
}

#[test]
fn test_contents_index_and_images() {
    let run = run_fixture();
    let index = read(&run, "README.md");
    assert!(index.starts_with("# Fixture Book\n"));
    assert!(index.contains("- 00a [[00a - Preface|Preface]]\n"));
    assert!(index.contains("- 01.0 [[01.0 - Chapter 1 Origins|Chapter 1 Origins]]\n"));
    assert!(index.contains("    - 01.1 [[01.1 - Further Origins|Further Origins]]\n"));
    assert!(index.contains("- 90 [[90 - References|References]]\n"));
    assert!(!index.contains("Silence"));
    assert!(run.out.path().join("images/fig.png").is_file());
    assert_eq!(run.report.chapters_detected, 3);
}

#[test]
fn test_missing_container_is_fatal() {
    let package = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let ctx = RunContext::new(package.path(), out.path(), out.path());
    let err = convert_package(&ctx, &FixtureConverter, &NoCitations, &metadata()).unwrap_err();
    assert!(matches!(
        err,
        Error::PackageStructure(PackageStructureError::MissingContainer(_))
    ));
}

#[test]
fn test_missing_navigation_is_fatal() {
    let package = TempDir::new().unwrap();
    write_package(package.path());
    let opf = OPF.replace(r#" properties="nav""#, "");
    fs::write(package.path().join("OEBPS/content.opf"), opf).unwrap();
    fs::remove_file(package.path().join("OEBPS/nav.xhtml")).unwrap();

    let out = TempDir::new().unwrap();
    let ctx = RunContext::new(package.path(), out.path(), out.path());
    let err = convert_package(&ctx, &FixtureConverter, &NoCitations, &metadata()).unwrap_err();
    assert!(matches!(
        err,
        Error::PackageStructure(PackageStructureError::MissingNavigation(_))
    ));
}
