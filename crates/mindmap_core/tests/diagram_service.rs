use mindmap_core::{
    AnonymousUserContext, ClaimsUserContext, DescriptionError, DescriptionGenerator, Diagram,
    DiagramAddRequest, DiagramColumn, DiagramService, DiagramUpdateRequest, Favorite, Filter,
    Pagination, RepoError, RepoResult, ServiceError, SortDirection, UnitOfWork, User,
    UserContext,
};
use std::cell::Cell;
use std::time::Duration;
use uuid::Uuid;

const OWNER: &str = "owner@example.com";
const OTHER: &str = "other@example.com";

struct FixedDescription(&'static str);

impl DescriptionGenerator for FixedDescription {
    fn generate_description(&self, _content_json: &str) -> Result<Option<String>, DescriptionError> {
        Ok(Some(self.0.to_string()))
    }
}

struct FailingDescription;

impl DescriptionGenerator for FailingDescription {
    fn generate_description(&self, _content_json: &str) -> Result<Option<String>, DescriptionError> {
        Err(DescriptionError::new("provider unavailable"))
    }
}

fn setup() -> (UnitOfWork, User, User) {
    let mut uow = UnitOfWork::open_in_memory().unwrap();
    let owner = User::new(OWNER, "Owner Person");
    let other = User::new(OTHER, "Other Person");
    uow.repository::<User>().create(&owner).unwrap();
    uow.repository::<User>().create(&other).unwrap();
    uow.complete().unwrap();
    (uow, owner, other)
}

fn as_user<'a>(uow: &'a mut UnitOfWork, email: &str) -> DiagramService<'a, ClaimsUserContext> {
    DiagramService::new(uow, ClaimsUserContext::new(email))
}

fn stored(uow: &mut UnitOfWork, diagram_id: Uuid) -> Option<Diagram> {
    uow.repository::<Diagram>()
        .get_by(&Filter::eq(DiagramColumn::DiagramId, diagram_id), false, &[])
        .unwrap()
}

fn favorites_of(uow: &mut UnitOfWork, diagram_id: Uuid) -> u64 {
    uow.repository::<Favorite>()
        .count(Some(&Filter::eq(
            mindmap_core::FavoriteColumn::DiagramId,
            diagram_id,
        )))
        .unwrap()
}

fn add_favorite(uow: &mut UnitOfWork, user: &User, diagram_id: Uuid) -> Favorite {
    let favorite = Favorite::new(user.user_id, diagram_id);
    uow.repository::<Favorite>().create(&favorite).unwrap();
    uow.complete().unwrap();
    favorite
}

#[test]
fn create_then_read_round_trips() {
    let (mut uow, owner, _) = setup();
    let mut service = as_user(&mut uow, OWNER);

    let created = service.create(DiagramAddRequest::new("T", "{}")).unwrap();
    let loaded = service.get_by_id(created.diagram_id).unwrap().unwrap();

    assert_eq!(loaded.title, "T");
    assert_eq!(loaded.content_json, "{}");
    assert_eq!(loaded.created_at, loaded.updated_at);
    assert_eq!(loaded.user_id, owner.user_id);
    assert_eq!(loaded.owner_full_name.as_deref(), Some("Owner Person"));
    assert!(!loaded.is_public);
    assert_eq!(loaded.base_diagram_id, None);
    assert_eq!(loaded.favorite_count, 0);
}

#[test]
fn create_requires_authenticated_user() {
    let (mut uow, _, _) = setup();
    let mut service = DiagramService::new(&mut uow, AnonymousUserContext);

    let err = service.create(DiagramAddRequest::new("T", "{}")).unwrap_err();
    assert!(matches!(err, ServiceError::NotAuthenticated));

    let mut unknown = as_user(&mut uow, "nobody@example.com");
    let err = unknown.create(DiagramAddRequest::new("T", "{}")).unwrap_err();
    assert!(matches!(err, ServiceError::NotAuthenticated));
}

#[test]
fn create_validates_request_before_anything_else() {
    let (mut uow, _, _) = setup();
    let mut service = DiagramService::new(&mut uow, AnonymousUserContext);

    let empty_title = service.create(DiagramAddRequest::new("  ", "{}")).unwrap_err();
    assert!(matches!(empty_title, ServiceError::InvalidArgument(_)));
    let long_title = service
        .create(DiagramAddRequest::new("x".repeat(101), "{}"))
        .unwrap_err();
    assert!(matches!(long_title, ServiceError::InvalidArgument(_)));
    let empty_content = service.create(DiagramAddRequest::new("T", "")).unwrap_err();
    assert!(matches!(empty_content, ServiceError::InvalidArgument(_)));
}

#[test]
fn create_with_unknown_base_is_not_found() {
    let (mut uow, _, _) = setup();
    let missing = Uuid::new_v4();

    let err = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("T", "{}").based_on(missing))
        .unwrap_err();
    match err {
        ServiceError::NotFound { key, .. } => assert_eq!(key, missing),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(uow.repository::<Diagram>().count(None).unwrap(), 0);
}

#[test]
fn generated_description_is_normalized_and_attached() {
    let (mut uow, _, _) = setup();
    let mut service = as_user(&mut uow, OWNER)
        .with_description_generator(FixedDescription("  A plan\nfor the week\r\n"));

    let created = service.create(DiagramAddRequest::new("T", "{}")).unwrap();
    assert_eq!(created.description.as_deref(), Some("A plan for the week"));
}

#[test]
fn failing_description_generator_never_aborts_create() {
    let (mut uow, _, _) = setup();
    let mut service = as_user(&mut uow, OWNER).with_description_generator(FailingDescription);

    let created = service.create(DiagramAddRequest::new("T", "{}")).unwrap();
    assert_eq!(created.description, None);
    assert!(service.get_by_id(created.diagram_id).unwrap().is_some());
}

#[test]
fn delete_orphans_derived_diagrams() {
    let (mut uow, _, _) = setup();
    let (base_id, d1, d2) = {
        let mut service = as_user(&mut uow, OWNER);
        let base = service.create(DiagramAddRequest::new("D", "{}")).unwrap();
        let d1 = service
            .create(DiagramAddRequest::new("d1", "{}").based_on(base.diagram_id))
            .unwrap();
        let d2 = service
            .create(DiagramAddRequest::new("d2", "{}").based_on(base.diagram_id))
            .unwrap();
        (base.diagram_id, d1.diagram_id, d2.diagram_id)
    };

    assert!(as_user(&mut uow, OWNER).delete(base_id).unwrap());

    assert!(stored(&mut uow, base_id).is_none());
    for derived_id in [d1, d2] {
        let derived = stored(&mut uow, derived_id).expect("derived diagram survives");
        assert_eq!(derived.base_diagram_id, None);
        assert!(derived.updated_at >= derived.created_at);
    }
}

#[test]
fn delete_removes_every_favorite_of_the_diagram() {
    let (mut uow, owner, other) = setup();
    let target = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("D", "{}").public())
        .unwrap();
    let keep = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Keep", "{}"))
        .unwrap();
    add_favorite(&mut uow, &owner, target.diagram_id);
    add_favorite(&mut uow, &other, target.diagram_id);
    add_favorite(&mut uow, &other, keep.diagram_id);

    assert!(as_user(&mut uow, OWNER).delete(target.diagram_id).unwrap());

    assert_eq!(favorites_of(&mut uow, target.diagram_id), 0);
    assert_eq!(favorites_of(&mut uow, keep.diagram_id), 1);
}

#[test]
fn delete_of_a_clone_detaches_it_from_its_base() {
    let (mut uow, _, _) = setup();
    let mut service = as_user(&mut uow, OWNER);
    let base = service.create(DiagramAddRequest::new("Base", "{}")).unwrap();
    let copy = service.clone_diagram(base.diagram_id).unwrap();

    assert!(service.delete(copy.diagram_id).unwrap());

    let base_after = service.get_by_id(base.diagram_id).unwrap().unwrap();
    assert_eq!(base_after.updated_at, base.updated_at);
    assert!(!base_after.is_clone);
    assert!(service.get_by_id(copy.diagram_id).unwrap().is_none());
}

#[test]
fn failed_favorite_removal_rolls_back_the_whole_delete() {
    let (mut uow, _, other) = setup();
    let (base_id, target_id, derived_id) = {
        let mut service = as_user(&mut uow, OWNER);
        let base = service.create(DiagramAddRequest::new("Base", "{}")).unwrap();
        let target = service
            .create(DiagramAddRequest::new("Target", "{}").based_on(base.diagram_id))
            .unwrap();
        let derived = service
            .create(DiagramAddRequest::new("Derived", "{}").based_on(target.diagram_id))
            .unwrap();
        (base.diagram_id, target.diagram_id, derived.diagram_id)
    };
    add_favorite(&mut uow, &other, target_id);
    let before_target = stored(&mut uow, target_id).unwrap();
    let before_derived = stored(&mut uow, derived_id).unwrap();

    uow.connection()
        .execute_batch(
            "CREATE TRIGGER block_favorite_delete BEFORE DELETE ON favorites
             BEGIN SELECT RAISE(ABORT, 'favorite delete blocked'); END;",
        )
        .unwrap();

    let err = as_user(&mut uow, OWNER).delete(target_id).unwrap_err();
    assert!(matches!(err, ServiceError::TransactionFailure(RepoError::Db(_))), "{err}");

    assert!(uow.active_transaction().is_none());
    assert_eq!(stored(&mut uow, target_id), Some(before_target.clone()));
    assert_eq!(before_target.base_diagram_id, Some(base_id));
    assert_eq!(stored(&mut uow, derived_id), Some(before_derived));
    assert_eq!(favorites_of(&mut uow, target_id), 1);
}

/// Acts as the owner, and before answering writes a clone and a favorite of
/// `target` the way another session would.
struct OwnerWithLateWriter {
    owner: ClaimsUserContext,
    writer: User,
    target: Uuid,
    written: Cell<bool>,
}

impl UserContext for OwnerWithLateWriter {
    fn current_user(&self, uow: &mut UnitOfWork) -> RepoResult<Option<User>> {
        if !self.written.replace(true) {
            let mut clone = Diagram::new("Late clone", "{}", self.writer.user_id);
            clone.base_diagram_id = Some(self.target);
            uow.repository::<Diagram>().create(&clone)?;
            uow.repository::<Favorite>()
                .create(&Favorite::new(self.writer.user_id, self.target))?;
            uow.complete()?;
        }
        self.owner.current_user(uow)
    }
}

#[test]
fn delete_maintains_dependents_written_before_the_transaction() {
    let (mut uow, _, other) = setup();
    let target = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Target", "{}").public())
        .unwrap();
    let context = OwnerWithLateWriter {
        owner: ClaimsUserContext::new(OWNER),
        writer: other.clone(),
        target: target.diagram_id,
        written: Cell::new(false),
    };

    assert!(DiagramService::new(&mut uow, &context)
        .delete(target.diagram_id)
        .unwrap());

    assert!(stored(&mut uow, target.diagram_id).is_none());
    assert_eq!(favorites_of(&mut uow, target.diagram_id), 0);
    let clones = uow
        .repository::<Diagram>()
        .find(&Filter::eq(DiagramColumn::UserId, other.user_id))
        .unwrap();
    assert_eq!(clones.len(), 1);
    assert_eq!(clones[0].base_diagram_id, None);
}

#[test]
fn delete_requires_authenticated_owner() {
    let (mut uow, _, _) = setup();
    let target = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Mine", "{}").public())
        .unwrap();

    let anonymous = DiagramService::new(&mut uow, AnonymousUserContext)
        .delete(target.diagram_id)
        .unwrap_err();
    assert!(matches!(anonymous, ServiceError::NotAuthenticated));

    let stranger = as_user(&mut uow, OTHER).delete(target.diagram_id).unwrap_err();
    assert!(matches!(stranger, ServiceError::Forbidden { key, .. } if key == target.diagram_id));

    assert!(uow.active_transaction().is_none());
    assert!(stored(&mut uow, target.diagram_id).is_some());
}

#[test]
fn delete_of_missing_diagram_returns_false() {
    let (mut uow, _, _) = setup();
    assert!(!as_user(&mut uow, OWNER).delete(Uuid::new_v4()).unwrap());
    assert!(uow.active_transaction().is_none());
}

#[test]
fn second_page_of_twenty_five_returns_items_eleven_to_twenty() {
    let (mut uow, owner, _) = setup();
    let mut service = as_user(&mut uow, OWNER);
    for index in 1..=25 {
        service
            .create(DiagramAddRequest::new(format!("Item {index:02}"), "{}"))
            .unwrap();
    }

    let page = service
        .get_user_diagrams(
            owner.user_id,
            &Pagination::page(2, 10).sorted_by("Title", SortDirection::Ascending),
        )
        .unwrap();

    assert_eq!(page.total_count, 25);
    assert_eq!(page.page_index, 2);
    assert_eq!(page.page_size, 10);
    let titles: Vec<&str> = page.items.iter().map(|item| item.title.as_str()).collect();
    let expected: Vec<String> = (11..=20).map(|index| format!("Item {index:02}")).collect();
    assert_eq!(titles, expected.iter().map(String::as_str).collect::<Vec<_>>());
}

#[test]
fn zero_pagination_falls_back_to_defaults() {
    let (mut uow, _, _) = setup();
    let mut service = as_user(&mut uow, OWNER);
    for index in 0..12 {
        service
            .create(DiagramAddRequest::new(format!("D{index}"), "{}"))
            .unwrap();
    }

    let page = service.get_all(None, &Pagination::page(0, 0)).unwrap();
    assert_eq!(page.page_index, 1);
    assert_eq!(page.page_size, 10);
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.total_count, 12);
}

#[test]
fn unknown_sort_field_is_rejected() {
    let (mut uow, _, _) = setup();
    let err = as_user(&mut uow, OWNER)
        .get_all(
            None,
            &Pagination::default().sorted_by("popularity", SortDirection::Descending),
        )
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidArgument(_)));
}

#[test]
fn favorite_flag_depends_on_acting_user() {
    let (mut uow, _, other) = setup();
    let favored = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Favored", "{}").public())
        .unwrap();
    as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Plain", "{}").public())
        .unwrap();
    add_favorite(&mut uow, &other, favored.diagram_id);

    let as_other = as_user(&mut uow, OTHER)
        .get_public(&Pagination::default())
        .unwrap();
    for item in &as_other.items {
        assert_eq!(item.is_in_favorite, item.diagram_id == favored.diagram_id);
    }
    let favored_item = as_other
        .items
        .iter()
        .find(|item| item.diagram_id == favored.diagram_id)
        .unwrap();
    assert_eq!(favored_item.favorite_count, 1);

    let anonymous = DiagramService::new(&mut uow, AnonymousUserContext)
        .get_public(&Pagination::default())
        .unwrap();
    assert_eq!(anonymous.total_count, 2);
    assert!(anonymous.items.iter().all(|item| !item.is_in_favorite && !item.is_clone));
}

#[test]
fn cloning_marks_source_as_cloned_for_the_cloner_only() {
    let (mut uow, _, _) = setup();
    let source = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Source", "{\"k\":1}").public())
        .unwrap();

    let copy = as_user(&mut uow, OTHER)
        .clone_diagram(source.diagram_id)
        .unwrap();
    assert_eq!(copy.base_diagram_id, Some(source.diagram_id));
    assert_eq!(copy.base_diagram_title.as_deref(), Some("Source"));
    assert_eq!(copy.base_diagram_content.as_deref(), Some("{\"k\":1}"));
    assert!(!copy.is_public);

    let seen_by_cloner = as_user(&mut uow, OTHER)
        .get_by_id(source.diagram_id)
        .unwrap()
        .unwrap();
    assert!(seen_by_cloner.is_clone);

    let seen_by_owner = as_user(&mut uow, OWNER)
        .get_by_id(source.diagram_id)
        .unwrap()
        .unwrap();
    assert!(!seen_by_owner.is_clone);
}

#[test]
fn private_diagram_of_another_user_cannot_be_cloned() {
    let (mut uow, _, _) = setup();
    let private = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Secret", "{}"))
        .unwrap();

    let err = as_user(&mut uow, OTHER)
        .clone_diagram(private.diagram_id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden { .. }));
}

#[test]
fn private_diagram_of_another_user_cannot_be_a_base() {
    let (mut uow, _, _) = setup();
    let private = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Secret", "{\"s\":1}"))
        .unwrap();

    let err = as_user(&mut uow, OTHER)
        .create(DiagramAddRequest::new("Mine", "{}").based_on(private.diagram_id))
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden { key, .. } if key == private.diagram_id));
    assert_eq!(uow.repository::<Diagram>().count(None).unwrap(), 1);

    let own = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Mine", "{}").based_on(private.diagram_id))
        .unwrap();
    assert_eq!(own.base_diagram_id, Some(private.diagram_id));
}

#[test]
fn update_applies_fields_and_keeps_owner() {
    let (mut uow, owner, _) = setup();
    let mut service = as_user(&mut uow, OWNER);
    let created = service.create(DiagramAddRequest::new("Draft", "{}")).unwrap();
    std::thread::sleep(Duration::from_millis(5));

    let updated = service
        .update(DiagramUpdateRequest {
            diagram_id: created.diagram_id,
            title: "Final".to_string(),
            content_json: "{\"done\":true}".to_string(),
            is_public: true,
        })
        .unwrap();

    assert_eq!(updated.title, "Final");
    assert_eq!(updated.content_json, "{\"done\":true}");
    assert!(updated.is_public);
    assert_eq!(updated.user_id, owner.user_id);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);
}

#[test]
fn update_by_non_owner_is_forbidden_and_changes_nothing() {
    let (mut uow, owner, _) = setup();
    let created = as_user(&mut uow, OWNER)
        .create(DiagramAddRequest::new("Mine", "{}").public())
        .unwrap();

    let err = as_user(&mut uow, OTHER)
        .update(DiagramUpdateRequest {
            diagram_id: created.diagram_id,
            title: "Hijacked".to_string(),
            content_json: "{}".to_string(),
            is_public: true,
        })
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden { .. }));

    let after = stored(&mut uow, created.diagram_id).unwrap();
    assert_eq!(after.title, "Mine");
    assert_eq!(after.user_id, owner.user_id);
}

#[test]
fn update_of_missing_diagram_is_not_found() {
    let (mut uow, _, _) = setup();
    let err = as_user(&mut uow, OWNER)
        .update(DiagramUpdateRequest {
            diagram_id: Uuid::new_v4(),
            title: "T".to_string(),
            content_json: "{}".to_string(),
            is_public: false,
        })
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
}

#[test]
fn title_search_matches_public_diagrams_ignoring_case() {
    let (mut uow, _, _) = setup();
    let mut service = as_user(&mut uow, OWNER);
    service
        .create(DiagramAddRequest::new("Project Roadmap", "{}").public())
        .unwrap();
    service
        .create(DiagramAddRequest::new("roadmap draft", "{}"))
        .unwrap();
    service
        .create(DiagramAddRequest::new("Groceries", "{}").public())
        .unwrap();

    let found = service
        .search_public_by_title("ROADMAP", &Pagination::default())
        .unwrap();
    assert_eq!(found.total_count, 1);
    assert_eq!(found.items[0].title, "Project Roadmap");
}
