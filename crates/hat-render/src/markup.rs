//! Inline `$...$` detection and the listener that answers it with images.

use std::sync::Arc;

use hat_core::{wait_for_shutdown, ChatOutbound, IncomingMessage};
use tokio::sync::{mpsc, watch};

use crate::RenderPipeline;

/// Returns the math fragments of `content`, surrounding `$` stripped.
///
/// A fragment opens at `$` and closes at the nearest following `$` that is
/// not preceded by a double backslash (`\\$`), without crossing a line break.
/// A single `\$` still closes. Empty fragments are dropped.
pub fn extract_math_fragments(content: &str) -> Vec<String> {
    let bytes = content.as_bytes();
    let mut fragments = Vec::new();
    let mut start = 0;
    while start < bytes.len() {
        if bytes[start] != b'$' {
            start += 1;
            continue;
        }
        match closing_dollar(bytes, start) {
            Some(end) => {
                let fragment = content[start..=end].trim_matches('$');
                if !fragment.trim().is_empty() {
                    fragments.push(fragment.to_string());
                }
                start = end + 1;
            }
            None => start += 1,
        }
    }
    fragments
}

pub fn has_math_fragments(content: &str) -> bool {
    !extract_math_fragments(content).is_empty()
}

fn closing_dollar(bytes: &[u8], open: usize) -> Option<usize> {
    for (index, byte) in bytes.iter().enumerate().skip(open + 1) {
        match byte {
            b'\n' => return None,
            b'$' if !(index >= 2 && &bytes[index - 2..index] == b"\\\\") => {
                return Some(index)
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MarkupRunReport {
    pub messages: usize,
    pub rendered: usize,
    pub failed: usize,
}

/// Renders every fragment of every queued message, one at a time, and posts
/// the images. Failures are logged and nothing is sent for that fragment.
pub async fn run_markup_listener(
    pipeline: Arc<RenderPipeline>,
    mut inbox: mpsc::UnboundedReceiver<Arc<IncomingMessage>>,
    outbound: Arc<dyn ChatOutbound>,
    mut shutdown: watch::Receiver<bool>,
) -> MarkupRunReport {
    let mut report = MarkupRunReport::default();
    tracing::info!("markup listener started");
    loop {
        let message = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            next = inbox.recv() => match next {
                Some(message) => message,
                None => break,
            },
        };
        report.messages = report.messages.saturating_add(1);

        let (rendered, failed) = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut shutdown) => break,
            counts = render_message(&pipeline, &message, outbound.as_ref()) => counts,
        };
        report.rendered = report.rendered.saturating_add(rendered);
        report.failed = report.failed.saturating_add(failed);
    }
    tracing::info!(
        messages = report.messages,
        rendered = report.rendered,
        failed = report.failed,
        "markup listener stopped"
    );
    report
}

async fn render_message(
    pipeline: &RenderPipeline,
    message: &IncomingMessage,
    outbound: &dyn ChatOutbound,
) -> (usize, usize) {
    let mut rendered = 0;
    let mut failed = 0;
    for (index, fragment) in extract_math_fragments(&message.content).iter().enumerate() {
        let image = match pipeline.render(message.id, index, fragment).await {
            Ok(image) => image,
            Err(error) => {
                failed += 1;
                tracing::warn!(message_id = message.id, index, %error, "markup render failed");
                if let crate::RenderError::NonZeroExit { output_tail, .. } = &error {
                    tracing::debug!(message_id = message.id, index, output_tail = %output_tail);
                }
                continue;
            }
        };
        match outbound.send_file(message.channel_id, &image.path()).await {
            Ok(()) => rendered += 1,
            Err(error) => {
                failed += 1;
                tracing::warn!(
                    message_id = message.id,
                    key = image.key(),
                    %error,
                    "markup image send failed"
                );
            }
        }
    }
    (rendered, failed)
}

#[cfg(test)]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::Result;
    use async_trait::async_trait;
    use hat_core::{shutdown_channel, ChatOutbound, IncomingMessage, MessageFlags};
    use tempfile::tempdir;
    use tokio::sync::mpsc;

    use super::{extract_math_fragments, has_math_fragments, run_markup_listener};
    use crate::{ExternalCommand, RenderConfig, RenderPipeline};

    #[derive(Default)]
    struct FileSink {
        files: Mutex<Vec<(PathBuf, bool)>>,
    }

    #[async_trait]
    impl ChatOutbound for FileSink {
        async fn broadcast_typing(&self, _channel_id: u64) -> Result<()> {
            Ok(())
        }

        async fn send_text(&self, _channel_id: u64, _content: &str) -> Result<()> {
            Ok(())
        }

        async fn send_file(&self, _channel_id: u64, path: &Path) -> Result<()> {
            if let Ok(mut files) = self.files.lock() {
                files.push((path.to_path_buf(), path.exists()));
            }
            Ok(())
        }
    }

    fn message(id: u64, content: &str) -> Arc<IncomingMessage> {
        Arc::new(IncomingMessage {
            id,
            author_id: 1,
            channel_id: 2,
            channel_name: "math".to_string(),
            content: content.to_string(),
            created_unix_ms: 0,
            flags: MessageFlags::default(),
        })
    }

    #[test]
    fn unit_extracts_each_inline_fragment_in_order() {
        assert_eq!(
            extract_math_fragments("area is $\\pi r^2$ and $2\\pi r$ around"),
            vec!["\\pi r^2".to_string(), "2\\pi r".to_string()]
        );
    }

    #[test]
    fn unit_single_backslash_dollar_still_closes_fragment() {
        assert_eq!(extract_math_fragments(r"$5 \$ off$"), vec![r"5 \".to_string()]);
    }

    #[test]
    fn regression_double_backslash_dollar_does_not_close_fragment() {
        assert_eq!(
            extract_math_fragments(r"$a \\$ b$ and $c$"),
            vec![r"a \\$ b".to_string(), "c".to_string()]
        );
    }

    #[test]
    fn unit_fragment_does_not_cross_line_breaks() {
        assert_eq!(extract_math_fragments("$a\nb $c$"), vec!["c".to_string()]);
        assert!(extract_math_fragments("one $ only").is_empty());
    }

    #[test]
    fn regression_empty_and_display_delimiters_are_skipped() {
        assert!(extract_math_fragments("$$").is_empty());
        assert!(extract_math_fragments("$ $").is_empty());
        assert!(!has_math_fragments("no math here"));
        assert!(has_math_fragments("pay $x$"));
    }

    #[test]
    fn unit_non_ascii_text_is_sliced_safely() {
        assert_eq!(
            extract_math_fragments("héllo $α+β$ ünïcode"),
            vec!["α+β".to_string()]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn functional_listener_sends_each_fragment_and_skips_failures() {
        let temp = tempdir().expect("tempdir");
        let compiler = temp.path().join("compiler.sh");
        let rasterizer = temp.path().join("rasterizer.sh");
        std::fs::write(
            &compiler,
            "for last; do :; done\ngrep -q BAD \"$last\" && exit 1\ncp \"$last\" \"${last%.tex}.pdf\"\n",
        )
        .expect("write compiler");
        std::fs::write(&rasterizer, "cp \"$2\" \"$3-1.png\"\n").expect("write rasterizer");

        let mut config = RenderConfig::new(temp.path().join("work"), "%equation%");
        config.compiler = ExternalCommand::new("sh").with_args([compiler.display().to_string()]);
        config.rasterizer =
            ExternalCommand::new("sh").with_args([rasterizer.display().to_string()]);
        let pipeline = Arc::new(RenderPipeline::new(config).expect("pipeline"));

        let (sender, inbox) = mpsc::unbounded_channel();
        let sink = Arc::new(FileSink::default());
        let (_shutdown_tx, shutdown_rx) = shutdown_channel();
        sender
            .send(message(77, "$a$ then $BAD$ then $c$"))
            .expect("queue");
        drop(sender);

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            run_markup_listener(pipeline, inbox, sink.clone(), shutdown_rx),
        )
        .await
        .expect("listener finishes");

        assert_eq!(report.messages, 1);
        assert_eq!(report.rendered, 2);
        assert_eq!(report.failed, 1);
        let files = sink.files.lock().expect("lock").clone();
        assert_eq!(
            files,
            vec![
                (temp.path().join("work/77_0-1.png"), true),
                (temp.path().join("work/77_2-1.png"), true),
            ]
        );
        assert_eq!(
            std::fs::read_dir(temp.path().join("work"))
                .expect("read work dir")
                .count(),
            0
        );
    }
}
