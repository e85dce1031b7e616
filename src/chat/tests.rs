use super::*;
use crate::conversation::{Exchange, PromptMessage, Role, UNKNOWN_ISSUE_REPLY};
use crate::embeddings::Embedder;
use crate::indexer::{IndexManager, RebuildMode};
use crate::test_support::{KeywordEmbedder, ScriptedCompleter, sample_tickets};
use crate::vector_index::{InMemoryIndexService, VectorIndexService};

struct Fixture {
    service: Arc<InMemoryIndexService>,
    completer: Arc<ScriptedCompleter>,
    engine: ChatEngine,
}

fn fixture(completer: ScriptedCompleter) -> Fixture {
    let service = Arc::new(InMemoryIndexService::new());
    let embedder: Arc<dyn Embedder> = Arc::new(KeywordEmbedder::default());
    let handle = IndexManager::new(
        Arc::clone(&service) as Arc<dyn VectorIndexService>,
        Arc::clone(&embedder),
    )
    .ensure_index("jira-demo", &sample_tickets(), RebuildMode::ReuseExisting)
    .expect("index should build")
    .into_handle();

    let completer = Arc::new(completer);
    let engine = ChatEngine {
        retriever: Retriever::new(
            Arc::clone(&service) as Arc<dyn VectorIndexService>,
            embedder,
        ),
        completer: Arc::clone(&completer) as Arc<dyn ChatCompleter>,
        handle,
        template: PromptTemplate::support_assistant("Hyer"),
        settings: ChatSettings::default(),
    };

    Fixture {
        service,
        completer,
        engine,
    }
}

#[test]
fn first_turn_sends_instructions_context_and_message() {
    let fx = fixture(ScriptedCompleter::replying(&["Try clearing the cache."]));
    let mut session = fx.engine.session(SessionMemory::unbounded());

    let reply = session
        .predict("The app crashes at login")
        .expect("turn should succeed");
    assert_eq!(reply, "Try clearing the cache.");

    let requests = fx.completer.recorded();
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;

    // Four instructions, one context message, the user message.
    assert_eq!(messages.len(), 6);
    assert!(messages[..5].iter().all(|m| m.role == Role::System));
    assert!(messages[3].content.contains(UNKNOWN_ISSUE_REPLY));
    assert!(
        messages[4]
            .content
            .starts_with("The ticket Login fails that is a Bug")
    );
    assert_eq!(messages[5], PromptMessage::user("The app crashes at login"));
    assert_eq!(requests[0].model, "gpt-4");
}

#[test]
fn second_turn_carries_history() {
    let fx = fixture(ScriptedCompleter::replying(&["Hello!", "Bye!"]));
    let mut session = fx.engine.session(SessionMemory::unbounded());

    session.predict("hi").expect("first turn");
    session.predict("bye").expect("second turn");

    assert_eq!(
        session.memory().history(),
        vec![Exchange::new("hi", "Hello!"), Exchange::new("bye", "Bye!")]
    );

    let requests = fx.completer.recorded();
    let second = &requests[1].messages;
    assert_eq!(
        &second[second.len() - 3..],
        &[
            PromptMessage::user("hi"),
            PromptMessage::assistant("Hello!"),
            PromptMessage::user("bye"),
        ]
    );
}

#[test]
fn completion_failure_leaves_memory_untouched() {
    let fx = fixture(ScriptedCompleter::failing("rate limited"));
    let mut session = fx.engine.session(SessionMemory::unbounded());

    let err = session.predict("login").expect_err("completion fails");
    assert!(matches!(err, SupportError::Completion(_)), "got {:?}", err);
    assert!(session.memory().is_empty());

    fx.completer.push_reply("Recovered");
    assert_eq!(session.predict("login").expect("retry works"), "Recovered");
    assert_eq!(session.memory().len(), 1);
}

#[test]
fn retrieval_failure_skips_completion() {
    let fx = fixture(ScriptedCompleter::replying(&["first"]));
    let mut session = fx.engine.session(SessionMemory::unbounded());
    session.predict("login").expect("first turn");

    fx.service
        .delete_index("jira-demo")
        .expect("delete should work");

    let err = session.predict("login again").expect_err("index is gone");
    assert!(matches!(err, SupportError::Retrieval(_)), "got {:?}", err);
    assert_eq!(session.memory().len(), 1);
    assert_eq!(fx.completer.recorded().len(), 1);
}

#[test]
fn blank_message_is_rejected_before_any_call() {
    let fx = fixture(ScriptedCompleter::default());
    let mut session = fx.engine.session(SessionMemory::unbounded());

    assert!(matches!(
        session.predict("   \n"),
        Err(SupportError::InvalidInput(_))
    ));
    assert!(fx.completer.recorded().is_empty());
}

#[test]
fn window_bounds_prompt_history() {
    let fx = fixture(ScriptedCompleter::replying(&["a", "b", "c"]));
    let mut session = fx.engine.session(SessionMemory::from_window_setting(1));

    session.predict("one").expect("turn one");
    session.predict("two").expect("turn two");
    session.predict("three").expect("turn three");

    let requests = fx.completer.recorded();
    let last = &requests[2].messages;
    assert!(!last.iter().any(|m| m.content == "one"));
    assert!(last.contains(&PromptMessage::user("two")));
    assert_eq!(session.memory().history(), vec![Exchange::new("three", "c")]);
}

#[test]
fn sessions_do_not_share_memory() {
    let fx = fixture(ScriptedCompleter::replying(&["x", "y"]));
    let mut first = fx.engine.session(SessionMemory::unbounded());
    let mut second = fx.engine.session(SessionMemory::unbounded());

    first.predict("login").expect("first session");
    second.predict("export").expect("second session");

    assert_eq!(first.memory().history(), vec![Exchange::new("login", "x")]);
    assert_eq!(second.memory().history(), vec![Exchange::new("export", "y")]);

    first.reset();
    assert!(first.memory().is_empty());
}
