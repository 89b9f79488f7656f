use std::env;

use snafu::{OptionExt, Snafu};

use plotline::{Conversation, StatusSeverity, merge_snapshot, status_severity};
use plotline_chart::{SERIES_PALETTE, plot_height, specs_from_payload, to_render_model};
use plotline_stream::{
    FrameParser, QueryEvent, SessionPhase, StreamClose, StreamFailure, StreamSession, Utf8Decoder,
};

#[derive(Debug, Clone)]
struct RunnerArgs {
    scenario: Scenario,
}

#[derive(Debug, Clone, Copy)]
enum Scenario {
    EndToEnd,
    FrameSplit,
    AccessDenied,
    ChartShapes,
    Cancellation,
    All,
}

impl Scenario {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "end_to_end" => Some(Self::EndToEnd),
            "frame_split" => Some(Self::FrameSplit),
            "access_denied" => Some(Self::AccessDenied),
            "chart_shapes" => Some(Self::ChartShapes),
            "cancellation" => Some(Self::Cancellation),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::EndToEnd => "end_to_end",
            Self::FrameSplit => "frame_split",
            Self::AccessDenied => "access_denied",
            Self::ChartShapes => "chart_shapes",
            Self::Cancellation => "cancellation",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Snafu)]
enum RunnerError {
    #[snafu(display("missing required --scenario argument"))]
    MissingScenario { stage: &'static str },
    #[snafu(display("missing value for argument '{arg}'"))]
    MissingArgumentValue {
        stage: &'static str,
        arg: &'static str,
    },
    #[snafu(display("unknown scenario '{raw}'"))]
    UnknownScenario { stage: &'static str, raw: String },
    #[snafu(display("unknown argument '{raw}'"))]
    UnknownArgument { stage: &'static str, raw: String },
    #[snafu(display("scenario '{scenario}' failed: {reason}"))]
    ScenarioFailed {
        stage: &'static str,
        scenario: &'static str,
        reason: String,
    },
}

type RunnerResult<T> = Result<T, RunnerError>;

fn main() {
    tracing_subscriber::fmt::init();

    if let Err(error) = run() {
        println!("runner_ok=false");
        eprintln!("runner_error={error}");
        std::process::exit(1);
    }
}

fn run() -> RunnerResult<()> {
    let args = parse_args(env::args().skip(1))?;
    println!("scenario={}", args.scenario.name());

    match args.scenario {
        Scenario::EndToEnd => run_end_to_end(),
        Scenario::FrameSplit => run_frame_split(),
        Scenario::AccessDenied => run_access_denied(),
        Scenario::ChartShapes => run_chart_shapes(),
        Scenario::Cancellation => run_cancellation(),
        Scenario::All => run_all(),
    }
}

fn parse_args(args: impl IntoIterator<Item = String>) -> RunnerResult<RunnerArgs> {
    let mut scenario = None;
    let mut pending = args.into_iter();

    while let Some(argument) = pending.next() {
        match argument.as_str() {
            "--scenario" => {
                let value = pending.next().context(MissingArgumentValueSnafu {
                    stage: "parse-args-scenario-value",
                    arg: "--scenario",
                })?;

                let parsed = Scenario::parse(&value).context(UnknownScenarioSnafu {
                    stage: "parse-args-scenario",
                    raw: value,
                })?;
                scenario = Some(parsed);
            }
            _ => {
                return UnknownArgumentSnafu {
                    stage: "parse-args",
                    raw: argument,
                }
                .fail();
            }
        }
    }

    Ok(RunnerArgs {
        scenario: scenario.context(MissingScenarioSnafu {
            stage: "parse-args-scenario-required",
        })?,
    })
}

fn run_all() -> RunnerResult<()> {
    run_end_to_end()?;
    run_frame_split()?;
    run_access_denied()?;
    run_chart_shapes()?;
    run_cancellation()?;
    Ok(())
}

const TRANSCRIPT: &str = concat!(
    "event:status\ndata: Searching documents\n\n",
    "event:token\ndata: 売上は \n\n",
    "event:token\ndata: 12%上昇<|n|>See chart:\n\n",
    "event:suggestions\ndata: [\"Break down by region\"]\n\n",
    "event:chart\ndata: {\"chart_type\":\"line\",\"title\":\"Revenue\",",
    "\"x_field\":\"q\",\"y_fields\":[\"rev\"],",
    "\"data\":[{\"q\":\"Q1\",\"rev\":100},{\"q\":\"Q2\",\"rev\":140}]}\n\n",
    "event:done\ndata: \n\n",
);

fn replay(transcript: &str) -> StreamSession {
    let mut session = StreamSession::new();
    session.begin();
    let mut parser = FrameParser::new();
    for frame in parser.feed(transcript) {
        if let Some(event) = QueryEvent::from_frame(&frame) {
            session.apply(event);
        }
    }
    session
}

fn ensure_scenario(
    scenario: &'static str,
    condition: bool,
    reason: &str,
) -> RunnerResult<()> {
    if condition {
        Ok(())
    } else {
        ScenarioFailedSnafu {
            stage: "scenario-check",
            scenario,
            reason: reason.to_string(),
        }
        .fail()
    }
}

fn run_end_to_end() -> RunnerResult<()> {
    let session = replay(TRANSCRIPT);

    ensure_scenario(
        "end_to_end",
        session.answer() == "売上は 12%上昇\nSee chart:",
        "answer text mismatch",
    )?;
    ensure_scenario(
        "end_to_end",
        session.phase() == SessionPhase::Done,
        "session did not finish",
    )?;
    ensure_scenario(
        "end_to_end",
        session.status_log() == ["Searching documents", "Completed"],
        "status log mismatch",
    )?;
    ensure_scenario(
        "end_to_end",
        session.chart_specs().map(<[_]>::len) == Some(1),
        "expected exactly one chart spec",
    )?;

    let mut conversation = Conversation::new("qa");
    conversation.push_exchange("How did revenue move?");
    merge_snapshot(&mut conversation, &session);
    ensure_scenario(
        "end_to_end",
        conversation.suggestions == ["Break down by region"]
            && conversation.messages[1].text == session.answer(),
        "conversation merge mismatch",
    )?;

    println!("end_to_end=true");
    println!("runner_ok=true");
    Ok(())
}

/// Replays the transcript byte-split at every offset; any split must produce
/// the same final state as one whole-buffer feed.
fn run_frame_split() -> RunnerResult<()> {
    let expected = replay(TRANSCRIPT);
    let bytes = TRANSCRIPT.as_bytes();

    for split in 1..bytes.len() {
        let mut session = StreamSession::new();
        session.begin();
        let mut decoder = Utf8Decoder::new();
        let mut parser = FrameParser::new();

        for chunk in [&bytes[..split], &bytes[split..]] {
            let text = decoder.decode(chunk);
            for frame in parser.feed(&text) {
                if let Some(event) = QueryEvent::from_frame(&frame) {
                    session.apply(event);
                }
            }
        }

        ensure_scenario(
            "frame_split",
            session == expected,
            &format!("split at byte {split} diverged"),
        )?;
    }

    println!("frame_split=true");
    println!("runner_ok=true");
    Ok(())
}

fn run_access_denied() -> RunnerResult<()> {
    let mut unauthorized = StreamSession::new();
    unauthorized.begin();
    unauthorized.close(StreamClose::AuthFailed);
    ensure_scenario(
        "access_denied",
        unauthorized.failure() == Some(StreamFailure::AuthFailed)
            && unauthorized.current_status() == "Authentication failed",
        "401 close mismatch",
    )?;

    let mut forbidden = StreamSession::new();
    forbidden.begin();
    forbidden.apply(QueryEvent::Token("partial".to_string()));
    forbidden.close(StreamClose::PermissionDenied);
    ensure_scenario(
        "access_denied",
        forbidden.failure() == Some(StreamFailure::PermissionDenied)
            && forbidden.answer() == "partial"
            && status_severity(&forbidden) == StatusSeverity::Error,
        "403 close mismatch",
    )?;

    // Backend-emitted denial statuses classify as errors mid-stream too.
    let mut denied_status = StreamSession::new();
    denied_status.begin();
    denied_status.apply(QueryEvent::Status(
        "You don't have access to collection 'finance'.".to_string(),
    ));
    ensure_scenario(
        "access_denied",
        denied_status.is_streaming() && status_severity(&denied_status) == StatusSeverity::Error,
        "backend denial status not classified",
    )?;

    println!("access_denied=true");
    println!("runner_ok=true");
    Ok(())
}

fn run_chart_shapes() -> RunnerResult<()> {
    let object = r#"{"chart_type":"bar","x_field":"q","y_fields":["rev"],"data":[{"q":"Q1","rev":1}]}"#;
    let shapes = [
        object.to_string(),
        format!("[{object}]"),
        format!("{{\"charts\":[{object}]}}"),
        format!("{{\"chart\":{object}}}"),
    ];

    let mut parsed = Vec::new();
    for shape in &shapes {
        let specs = specs_from_payload(shape).context(ScenarioFailedSnafu {
            stage: "scenario-chart-shapes-parse",
            scenario: "chart_shapes",
            reason: "payload shape rejected".to_string(),
        })?;
        parsed.push(specs);
    }
    ensure_scenario(
        "chart_shapes",
        parsed.windows(2).all(|pair| pair[0] == pair[1]),
        "payload shapes did not normalize identically",
    )?;

    let model = to_render_model(&parsed[0][0]);
    ensure_scenario(
        "chart_shapes",
        model.series.len() == 1 && model.series[0].color == SERIES_PALETTE[0],
        "render model series mismatch",
    )?;
    ensure_scenario(
        "chart_shapes",
        plot_height(1) == plot_height(12) && plot_height(12) < plot_height(13),
        "height band boundary mismatch",
    )?;
    ensure_scenario(
        "chart_shapes",
        specs_from_payload("not json").is_none(),
        "malformed payload must clear the chart section",
    )?;

    println!("chart_shapes=true");
    println!("runner_ok=true");
    Ok(())
}

fn run_cancellation() -> RunnerResult<()> {
    let mut session = StreamSession::new();
    session.begin();
    session.apply(QueryEvent::Token("keep me".to_string()));
    session.close(StreamClose::Cancelled);

    ensure_scenario(
        "cancellation",
        session.phase() == SessionPhase::Stopped
            && session.answer() == "keep me"
            && session.current_status() == "Stopped"
            && session.failure().is_none(),
        "cancel close mismatch",
    )?;

    // Frames flushed after the stop must be ignored.
    session.apply(QueryEvent::Token(" late".to_string()));
    session.close(StreamClose::Failed);
    ensure_scenario(
        "cancellation",
        session.answer() == "keep me" && session.failure().is_none(),
        "late frames leaked past the stop",
    )?;

    println!("cancellation=true");
    println!("runner_ok=true");
    Ok(())
}
