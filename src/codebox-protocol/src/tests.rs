//! Tests for the output multiplexing protocol.

use pretty_assertions::assert_eq;

use super::*;

mod tagging_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tag_wraps_text() {
        assert_eq!(tag(OutputStream::Out, "hi"), "<outStream>hi</outStream>");
        assert_eq!(tag(OutputStream::Err, "no"), "<errStream>no</errStream>");
    }

    #[test]
    fn test_collapse_merges_same_stream() {
        let text = "<outStream>a</outStream><outStream>b</outStream>";
        assert_eq!(collapse_adjacent_tags(text), "<outStream>ab</outStream>");
    }

    #[test]
    fn test_collapse_keeps_stream_changes() {
        let text = "<outStream>1</outStream><errStream>A</errStream><outStream>2</outStream>";
        assert_eq!(collapse_adjacent_tags(text), text);
    }

    #[test]
    fn test_collapse_is_idempotent() {
        let inputs = [
            "<outStream>a</outStream><outStream>b</outStream><errStream>c</errStream><errStream>d</errStream>",
            "</outStream></outStream><outStream><outStream>",
            "<errStream>x</errStream></errStream><errStream><errStream>y</errStream>",
            "",
            "plain text",
        ];
        for input in inputs {
            let once = collapse_adjacent_tags(input);
            let twice = collapse_adjacent_tags(&once);
            assert_eq!(once, twice, "input: {input}");
        }
    }

    #[test]
    fn test_many_small_writes_collapse_to_one_segment() {
        let tagged: String = ["h", "e", "l", "l", "o"]
            .iter()
            .map(|c| tag(OutputStream::Out, c))
            .collect();
        assert_eq!(collapse_adjacent_tags(&tagged), "<outStream>hello</outStream>");
    }
}

mod decoding_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_interleaved_streams_keep_order() {
        let tagged = collapse_adjacent_tags(&format!(
            "{}{}{}",
            tag(OutputStream::Out, "1"),
            tag(OutputStream::Err, "A"),
            tag(OutputStream::Out, "2"),
        ));
        let segments = decode_segments(&tagged);
        assert_eq!(
            segments,
            vec![
                Segment::new(OutputStream::Out, "1"),
                Segment::new(OutputStream::Err, "A"),
                Segment::new(OutputStream::Out, "2"),
            ]
        );

        let output = RunOutput::new(tagged);
        assert_eq!(output.stream_text(OutputStream::Out), "12");
        assert_eq!(output.stream_text(OutputStream::Err), "A");
    }

    #[test]
    fn test_untagged_text_is_out_stream() {
        let segments = decode_segments("before<errStream>bad</errStream>after");
        assert_eq!(
            segments,
            vec![
                Segment::new(OutputStream::Out, "before"),
                Segment::new(OutputStream::Err, "bad"),
                Segment::new(OutputStream::Out, "after"),
            ]
        );
    }

    #[test]
    fn test_unclosed_tag_runs_to_end() {
        let segments = decode_segments("<outStream>ok</outStream><errStream>Boom: broken");
        assert_eq!(
            segments,
            vec![
                Segment::new(OutputStream::Out, "ok"),
                Segment::new(OutputStream::Err, "Boom: broken"),
            ]
        );
    }

    #[test]
    fn test_stray_end_tags_are_dropped() {
        let segments = decode_segments("</errStream>tail");
        assert_eq!(segments, vec![Segment::new(OutputStream::Out, "tail")]);
    }

    #[test]
    fn test_empty_input_has_no_segments() {
        assert!(decode_segments("").is_empty());
        assert!(decode_segments("<outStream></outStream>").is_empty());
    }
}

mod record_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_output_json_shape() {
        let output = RunOutput::new("<outStream>hi</outStream>")
            .with_exception(ExceptionDescriptor::new("ExitStatus", "exited with status 3"));
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "text": "<outStream>hi</outStream>",
                "exception": { "type": "ExitStatus", "message": "exited with status 3" }
            })
        );
    }

    #[test]
    fn test_run_output_without_exception_omits_field() {
        let json = serde_json::to_string(&RunOutput::new("x")).unwrap();
        assert_eq!(json, r#"{"text":"x"}"#);
    }

    #[test]
    fn test_fallback_record_is_valid_json() {
        let record = fallback_record("HarnessError", "bad \"quote\"\nnext line\\ and \u{1} control");
        let parsed: RunOutput = serde_json::from_str(&record).unwrap();
        assert!(parsed.exception.is_none());
        assert_eq!(
            parsed.stream_text(OutputStream::Err),
            "HarnessError: bad \"quote\"\nnext line\\ and \u{1} control"
        );
        assert_eq!(parsed.stream_text(OutputStream::Out), "");
    }

    #[test]
    fn test_fallback_record_lists_causes() {
        let record = fallback_record_with_causes(
            "PolicyError",
            "Failed to read policy /s/p.toml",
            &["No such file or directory (os error 2)"],
        );
        let parsed: RunOutput = serde_json::from_str(&record).unwrap();
        assert_eq!(
            parsed.text,
            "<errStream>PolicyError: Failed to read policy /s/p.toml\nCaused by: No such file or directory (os error 2)</errStream>"
        );
        assert_eq!(
            fallback_record_with_causes::<String>("Panic", "boom", &[]),
            fallback_record("Panic", "boom")
        );
    }

    #[test]
    fn test_from_harness_stdout_accepts_garbage() {
        let output = RunOutput::from_harness_stdout("Segmentation fault").unwrap();
        assert_eq!(output.stream_text(OutputStream::Err), "Segmentation fault");
        assert!(RunOutput::from_harness_stdout("  \n").is_none());
    }

    #[test]
    fn test_from_harness_stdout_parses_record() {
        let output = RunOutput::from_harness_stdout("{\"text\":\"<outStream>ok</outStream>\"}\n")
            .unwrap();
        assert_eq!(output.stream_text(OutputStream::Out), "ok");
    }
}

mod frame_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_frame_line_format() {
        let line = StreamFrame::OutStream("hi\n".to_string()).to_line().unwrap();
        assert_eq!(line, "{\"outStream\":\"hi\\n\"}\n");

        let line = StreamFrame::Exception(ExceptionDescriptor::new("Signal", "SIGKILL"))
            .to_line()
            .unwrap();
        assert_eq!(
            line,
            "{\"exception\":{\"type\":\"Signal\",\"message\":\"SIGKILL\"}}\n"
        );
    }

    #[test]
    fn test_decode_line_regular_frame() {
        let frames = StreamFrame::decode_line("{\"errStream\":\"A\"}\n");
        assert_eq!(frames, vec![StreamFrame::ErrStream("A".to_string())]);
    }

    #[test]
    fn test_decode_line_accepts_fallback_record() {
        let frames = StreamFrame::decode_line(&fallback_record("Panic", "index out of bounds"));
        assert_eq!(
            frames,
            vec![StreamFrame::ErrStream(
                "Panic: index out of bounds".to_string()
            )]
        );
    }

    #[test]
    fn test_decode_line_garbage_becomes_err_stream() {
        let frames = StreamFrame::decode_line("not json at all");
        assert_eq!(
            frames,
            vec![StreamFrame::ErrStream("not json at all\n".to_string())]
        );
        assert!(StreamFrame::decode_line("\n").is_empty());
    }

    #[test]
    fn test_transcript_matches_synchronous_result() {
        let writes = [
            (OutputStream::Out, "1"),
            (OutputStream::Out, "1b"),
            (OutputStream::Err, "A"),
            (OutputStream::Out, "2"),
        ];

        let synchronous = RunOutput::new(collapse_adjacent_tags(
            &writes
                .iter()
                .map(|(stream, text)| tag(*stream, text))
                .collect::<String>(),
        ))
        .with_exception(ExceptionDescriptor::new("ExitStatus", "exited with status 1"));

        let mut frames: Vec<StreamFrame> = writes
            .iter()
            .map(|(stream, text)| StreamFrame::output(*stream, *text))
            .collect();
        frames.push(StreamFrame::Exception(ExceptionDescriptor::new(
            "ExitStatus",
            "exited with status 1",
        )));

        // Round-trip through the wire format like the executor does.
        let relayed: Vec<StreamFrame> = frames
            .iter()
            .flat_map(|f| StreamFrame::decode_line(&f.to_line().unwrap()))
            .collect();
        assert_eq!(relayed, frames);

        let transcript: StreamTranscript = relayed.iter().collect();
        assert_eq!(transcript.into_run_output(), synchronous);
    }

    #[test]
    fn test_transcript_collects_diagnostics() {
        let mut transcript = StreamTranscript::new();
        transcript.push(&StreamFrame::Diagnostics(vec![Diagnostic::warning(
            "main.rs",
            "unused variable",
        )]));
        assert_eq!(transcript.diagnostics().len(), 1);
        assert_eq!(transcript.into_run_output(), RunOutput::default());
    }
}

mod harness_entry_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entry_names_round_trip() {
        for entry in [HarnessEntry::Run, HarnessEntry::Streaming] {
            assert_eq!(entry.as_str().parse::<HarnessEntry>(), Ok(entry));
        }
        assert!("main".parse::<HarnessEntry>().is_err());
    }

    #[test]
    fn test_has_errors_ignores_warnings() {
        let warnings = vec![Diagnostic::warning("a", "w")];
        assert!(!has_errors(&warnings));
        let mixed = vec![Diagnostic::warning("a", "w"), Diagnostic::error("a", "e")];
        assert!(has_errors(&mixed));
    }
}
