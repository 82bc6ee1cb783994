use std::io;
use std::sync::{Arc, Mutex};

use archiver_engine::{
    default_embedder_command, post_process, ArchiveResult, CapturedOutput, CommandSpec,
    Embedder, FailureKind, HtmlVariant, MarkdownConverter, MonolithEmbedder, PandocConverter,
    Polisher, ProcessRunner, ReadabilityPolisher,
};
use pretty_assertions::assert_eq;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    program: String,
    args: Vec<String>,
    stdin: String,
}

/// Replays a canned output and records every invocation.
struct ScriptedRunner {
    output: io::Result<CapturedOutput>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    fn replying(exit_code: i32, stdout: &str, stderr: &str) -> Arc<Self> {
        Arc::new(Self {
            output: Ok(CapturedOutput {
                exit_code: Some(exit_code),
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
            }),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn missing_binary() -> Arc<Self> {
        Arc::new(Self {
            output: Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        extra_args: &[String],
        stdin: &[u8],
    ) -> io::Result<CapturedOutput> {
        self.calls.lock().unwrap().push(Invocation {
            program: command.program.clone(),
            args: command.args.iter().chain(extra_args).cloned().collect(),
            stdin: String::from_utf8_lossy(stdin).into_owned(),
        });
        match &self.output {
            Ok(output) => Ok(output.clone()),
            Err(err) => Err(io::Error::new(err.kind(), err.to_string())),
        }
    }
}

fn readability() -> CommandSpec {
    CommandSpec::new("node", ["index.mjs"])
}

#[tokio::test]
async fn polisher_parses_html_and_metadata() {
    let runner = ScriptedRunner::replying(
        0,
        r#"{"html":"<article>Body</article>","metadata":{"title":"Hello","byline":"Ann"}}"#,
        "",
    );
    let polisher = ReadabilityPolisher::new(runner.clone(), readability());

    let polished = polisher.polish("<html><body>raw</body></html>").await.unwrap();
    assert_eq!(polished.html, "<article>Body</article>");
    assert_eq!(polished.metadata["title"], Value::from("Hello"));
    assert_eq!(polished.metadata["byline"], Value::from("Ann"));

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].stdin, "<html><body>raw</body></html>");
    assert_eq!(calls[0].args, vec!["index.mjs".to_string()]);
}

#[tokio::test]
async fn polisher_failures_are_polish_errors() {
    let bad_exit = ScriptedRunner::replying(1, "", "Readability failed");
    let err = ReadabilityPolisher::new(bad_exit, readability())
        .polish("<p>x</p>")
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Polish);
    assert!(err.message.contains("exit code 1"));
    assert!(err.message.contains("Readability failed"));

    let bad_json = ScriptedRunner::replying(0, "<html>not json</html>", "");
    let err = ReadabilityPolisher::new(bad_json, readability())
        .polish("<p>x</p>")
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Polish);

    let missing = ScriptedRunner::missing_binary();
    let err = ReadabilityPolisher::new(missing, readability())
        .polish("<p>x</p>")
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Polish);
}

#[tokio::test]
async fn embedder_bases_urls_and_drops_media() {
    let runner = ScriptedRunner::replying(0, "<html>inlined</html>", "WARNING: 404 for logo.png");
    let embedder = MonolithEmbedder::new(runner.clone(), default_embedder_command());

    let embedded = embedder
        .embed("https://example.com/post", "<article/>", HtmlVariant::Polished)
        .await
        .unwrap();
    assert_eq!(embedded.html, "<html>inlined</html>");
    assert_eq!(embedded.source, HtmlVariant::Polished);

    let call = &runner.calls()[0];
    assert_eq!(call.program, "monolith");
    assert_eq!(
        call.args,
        ["-", "-I", "-a", "-v", "-b", "https://example.com/post"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
    );
    assert_eq!(call.stdin, "<article/>");
}

#[tokio::test]
async fn embedder_non_zero_exit_is_embed_error() {
    let runner = ScriptedRunner::replying(2, "", "boom");
    let err = MonolithEmbedder::new(runner, default_embedder_command())
        .embed("https://example.com", "<p/>", HtmlVariant::Rendered)
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Embed);
}

#[tokio::test]
async fn pandoc_selects_gfm_without_wrapping() {
    let runner = ScriptedRunner::replying(0, "# Title\n\nBody\n", "");
    let converter = PandocConverter::new(runner.clone(), CommandSpec::new("pandoc", Vec::<String>::new()), true);

    let markdown = converter.to_markdown("<h1>Title</h1><p>Body</p>").await.unwrap();
    assert_eq!(markdown, "# Title\n\nBody");

    let call = &runner.calls()[0];
    assert_eq!(
        call.args,
        ["-f", "html", "-t", "gfm+raw_html", "--wrap=none"]
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
    );

    let failing = ScriptedRunner::replying(64, "", "unknown option");
    let err = PandocConverter::new(failing, CommandSpec::new("pandoc", Vec::<String>::new()), true)
        .to_markdown("<p/>")
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Convert);
}

#[tokio::test]
async fn post_process_receives_result_json_on_stdin() {
    let runner = ScriptedRunner::replying(0, "posted\n", "");
    let mut metadata = serde_json::Map::new();
    metadata.insert("title".into(), Value::from("T"));
    metadata.insert("url".into(), Value::from("https://example.com"));
    let result = ArchiveResult {
        metadata,
        files: Default::default(),
        failures: Vec::new(),
    };

    let printed = post_process(runner.as_ref(), &CommandSpec::new("jq", ["."]), &result)
        .await
        .unwrap();
    assert_eq!(printed, "posted");

    let sent: Value = serde_json::from_str(&runner.calls()[0].stdin).unwrap();
    assert_eq!(sent["metadata"]["title"], Value::from("T"));
    assert!(sent["files"].as_object().unwrap().is_empty());
}
