mod common;

use serde_json::json;
use url::Url;

use common::{FakePage, PageContent, ScriptedOperator, ScriptedService, Site, call};
use webgoal::goal::{GoalPrompt, OperatorAnswer};
use webgoal::{ActionChooser, Goal, GoalEngine, Mode, SessionController};

const HOME: &str = "http://localhost:3000/";

fn site() -> std::sync::Arc<Site> {
    let site = Site::new();
    site.page(HOME, PageContent::new("Home", "Welcome").links(&["/products", "/signup"]));
    site.page(
        "http://localhost:3000/products",
        PageContent::new("Products", "All products").links(&["/"]),
    );
    site
}

fn engine(site: std::sync::Arc<Site>, service: std::sync::Arc<ScriptedService>) -> (GoalEngine, std::sync::Arc<FakePage>) {
    let page = FakePage::new(site);
    let goal = Goal::new(
        "Browse products",
        "The products page is shown",
        Url::parse(HOME).unwrap(),
    );
    let engine = GoalEngine::new(goal, page.clone(), ActionChooser::new(service));
    (engine, page)
}

#[tokio::test]
async fn scripted_session_walks_the_transition_table() {
    let service = ScriptedService::new(vec![
        call("choose_action", json!({"action_name": "navigate_to_url", "reason": "products live there"})),
        call("navigate_to_url", json!({"url": "/products"})),
        call("choose_action", json!({"action_name": "assert_page_url", "reason": "check we arrived"})),
        call("assert_page_url", json!({"pattern": "/products$", "is_goal_completion": true})),
    ]);
    let (mut engine, page) = engine(site(), service.clone());
    engine.initialize().await.unwrap();
    assert_eq!(page.current_url(), HOME);

    let mut steps = Vec::new();
    for _ in 0..4 {
        steps.push(engine.step().await.unwrap().expect("scripted reply"));
    }

    let modes: Vec<(Mode, Mode)> = steps.iter().map(|s| (s.mode, s.next_mode)).collect();
    assert_eq!(
        modes,
        vec![
            (Mode::ChooseAction, Mode::NavigateToUrl),
            (Mode::NavigateToUrl, Mode::ChooseAction),
            (Mode::ChooseAction, Mode::AssertPageUrl),
            (Mode::AssertPageUrl, Mode::ChooseAction),
        ]
    );
    assert!(steps[..3].iter().all(|s| !s.done));
    assert!(steps[3].done);
    assert_eq!(page.current_url(), "http://localhost:3000/products");
    assert!(engine.errors().is_empty());
    assert_eq!(
        engine.history().messages(None),
        vec![
            "Visit http://localhost:3000/products",
            "Assert page URL /products$",
            "Page URL http://localhost:3000/products matches /products$",
        ]
    );

    let requests = service.requests();
    assert_eq!(requests[0].schema_name(), "choose_action");
    assert_eq!(requests[1].schema_name(), "navigate_to_url");
    let navigate_schema = serde_json::to_value(&requests[1].tools[0].function).unwrap();
    assert_eq!(
        navigate_schema["parameters"]["properties"]["url"]["enum"],
        json!(["/products", "/signup"])
    );
}

#[tokio::test]
async fn prompt_carries_goal_page_and_recent_history() {
    let service = ScriptedService::new(vec![
        call("choose_action", json!({"action_name": "navigate_to_url", "reason": ""})),
        call("navigate_to_url", json!({"url": "/products"})),
        call("choose_action", json!({"action_name": "complete", "reason": "done"})),
    ]);
    let (mut engine, _page) = engine(site(), service.clone());
    engine.initialize().await.unwrap();
    for _ in 0..3 {
        engine.step().await.unwrap();
    }

    let last = service.requests().pop().unwrap();
    let contents: Vec<&str> = last.messages.iter().map(|m| m.content.as_str()).collect();
    assert!(contents.contains(&"Your objective is: Browse products"));
    assert!(contents.contains(&"You've achieved the objective when: The products page is shown"));
    assert!(contents.contains(&"Page URL: http://localhost:3000/products"));
    assert!(contents.contains(&"You already tried: Visit http://localhost:3000/products"));
    assert_eq!(contents.last(), Some(&"What is your next action?"));
    assert_eq!(last.model, "gpt-3.5-turbo");
}

#[tokio::test]
async fn missing_selector_is_recorded_as_an_error() {
    let site = site();
    site.missing(&["#flash"]);
    let service = ScriptedService::new(vec![
        call("choose_action", json!({"action_name": "assert_css_selector", "reason": ""})),
        call("assert_css_selector", json!({"selector": "#flash", "is_goal_completion": true})),
    ]);
    let (mut engine, _page) = engine(site, service);
    engine.initialize().await.unwrap();

    engine.step().await.unwrap();
    let step = engine.step().await.unwrap().unwrap();
    assert!(!step.done);
    assert_eq!(engine.errors(), ["selector was not found"]);
    assert_eq!(
        engine.history().messages(None),
        vec!["Assert CSS selector #flash, failed with error: selector was not found"]
    );
}

#[tokio::test]
async fn no_decision_leaves_the_engine_untouched() {
    let service = ScriptedService::new(vec![]);
    let (mut engine, _page) = engine(site(), service.clone());
    engine.initialize().await.unwrap();

    assert!(engine.step().await.unwrap().is_none());
    assert_eq!(engine.goal().current_mode, Mode::ChooseAction);
    assert!(engine.history().is_empty());
    assert!(engine.errors().is_empty());
    assert_eq!(service.requests().len(), 1);
}

#[tokio::test]
async fn unsupported_choice_is_noted_in_history() {
    let service = ScriptedService::new(vec![call(
        "choose_action",
        json!({"action_name": "assert_response", "reason": ""}),
    )]);
    let (mut engine, _page) = engine(site(), service);
    engine.initialize().await.unwrap();

    let step = engine.step().await.unwrap().unwrap();
    assert_eq!(step.next_mode, Mode::ChooseAction);
    assert_eq!(
        engine.history().messages(None),
        vec!["I don't know how to handle assert_response yet. Please try something else."]
    );
}

#[tokio::test]
async fn form_submission_is_best_effort() {
    let site = site();
    site.missing(&["form [name=\"nickname\"]", "#nickname"]);
    site.clicks_navigate(&[Some("http://localhost:3000/welcome")]);
    let service = ScriptedService::new(vec![
        call("choose_action", json!({"action_name": "submit_form", "reason": ""})),
        call(
            "submit_form",
            json!({
                "fields": [
                    {"form_element_name": "email", "form_element_value": "user@example.com"},
                    {"form_element_name": "nickname", "form_element_value": "user"}
                ],
                "submit_element_name": "commit"
            }),
        ),
    ]);
    let (mut engine, page) = engine(site, service);
    engine.initialize().await.unwrap();

    engine.step().await.unwrap();
    engine.step().await.unwrap();

    assert_eq!(
        page.fills(),
        vec![("form [name=\"email\"]".to_string(), "user@example.com".to_string())]
    );
    assert_eq!(page.selected(), vec!["form [name=\"email\"]".to_string()]);
    assert_eq!(page.clicks(), vec!["form [name=\"commit\"]".to_string()]);
    assert_eq!(page.current_url(), "http://localhost:3000/welcome");
    assert_eq!(page.waits(), vec![HOME.to_string()]);
    assert_eq!(
        engine.errors(),
        ["Errors occurred submitting form: could not set nickname"]
    );
    let history = engine.history().messages(None);
    assert!(history[0].starts_with("Submitting form with fields email, nickname, failed with error:"));
}

#[tokio::test]
async fn submission_without_navigation_still_counts_as_submitted() {
    let service = ScriptedService::new(vec![
        call("choose_action", json!({"action_name": "submit_form", "reason": ""})),
        call(
            "submit_form",
            json!({
                "fields": [{"form_element_name": "q", "form_element_value": "shoes"}],
                "submit_element_name": "search"
            }),
        ),
    ]);
    let (mut engine, page) = engine(site(), service);
    engine.initialize().await.unwrap();

    engine.step().await.unwrap();
    engine.step().await.unwrap();

    // The wait times out on the unchanged URL, which is tolerated.
    assert_eq!(page.waits(), vec![HOME.to_string()]);
    assert_eq!(page.current_url(), HOME);
    assert!(engine.errors().is_empty());
    assert_eq!(
        engine.history().messages(None),
        vec!["Submitting form with fields q", "Form submitted successfully"]
    );
}

#[tokio::test]
async fn controller_offers_a_new_goal_after_completion() {
    let service = ScriptedService::new(vec![
        call("choose_action", json!({"action_name": "complete", "reason": "already there"})),
        call("choose_action", json!({"action_name": "complete", "reason": "nothing to do"})),
    ]);
    let (mut engine, _page) = engine(site(), service);
    engine.initialize().await.unwrap();

    let operator = ScriptedOperator::new(vec![OperatorAnswer::Replace {
        goal: "Sign up".to_string(),
        success_criteria: String::new(),
    }]);
    let asked = operator.asked.clone();
    let mut controller = SessionController::new(engine, operator);
    controller.run().await.unwrap();

    assert_eq!(*asked.lock(), vec![GoalPrompt::NewGoal, GoalPrompt::NewGoal]);
    let (engine, steps) = controller.into_parts();
    assert_eq!(steps.len(), 2);
    assert!(steps.iter().all(|s| s.done));
    assert_eq!(engine.goal().goal_text, "Sign up");
    assert_eq!(
        steps[0].to_string(),
        "From mode choose_action, chose {\"action_name\":\"complete\",\"reason\":\"already there\"} and transitioned to choose_action"
    );
}

#[tokio::test]
async fn controller_asks_to_adjust_after_a_failure() {
    let site = site();
    site.missing(&["#flash"]);
    let service = ScriptedService::new(vec![
        call("choose_action", json!({"action_name": "assert_css_selector", "reason": ""})),
        call("assert_css_selector", json!({"selector": "#flash", "is_goal_completion": false})),
    ]);
    let (mut engine, _page) = engine(site, service);
    engine.initialize().await.unwrap();

    let operator = ScriptedOperator::new(vec![OperatorAnswer::Quit]);
    let asked = operator.asked.clone();
    let mut controller = SessionController::new(engine, operator);
    controller.run().await.unwrap();

    assert_eq!(*asked.lock(), vec![GoalPrompt::AdjustGoal]);
    assert_eq!(controller.steps().len(), 2);
    assert_eq!(controller.engine().errors().len(), 1);
}

#[tokio::test]
async fn controller_asks_to_adjust_after_six_steps_without_progress() {
    let round_trip = || {
        vec![
            call("choose_action", json!({"action_name": "navigate_to_url", "reason": ""})),
            call("navigate_to_url", json!({"url": "/products"})),
            call("choose_action", json!({"action_name": "navigate_to_url", "reason": ""})),
            call("navigate_to_url", json!({"url": "/"})),
        ]
    };
    let service = ScriptedService::new(round_trip().into_iter().cycle().take(12).collect());
    let (mut engine, _page) = engine(site(), service);
    engine.initialize().await.unwrap();

    let operator = ScriptedOperator::new(vec![OperatorAnswer::Keep, OperatorAnswer::Quit]);
    let asked = operator.asked.clone();
    let mut controller = SessionController::new(engine, operator);
    controller.run().await.unwrap();

    // Six steps to the first prompt, then six more after the count restarts.
    assert_eq!(*asked.lock(), vec![GoalPrompt::AdjustGoal, GoalPrompt::AdjustGoal]);
    assert_eq!(controller.steps().len(), 12);
    assert!(controller.steps().iter().all(|s| !s.done));
    assert!(controller.engine().errors().is_empty());
}
