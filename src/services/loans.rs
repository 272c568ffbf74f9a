//! Loan lifecycle service

use chrono::{DateTime, Utc};

use super::overdue::plan_sweep;
use crate::{
    config::LoansConfig,
    error::{AppError, AppResult},
    models::{
        loan::{default_due_date, CreateLoan, LoanDetails, LoanFilter, LoanListEntry, LoanQuery, LoanStatus, NewLoan},
        PaginatedResponse,
    },
    policy::{authorize, Action, Actor, Decision},
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    config: LoansConfig,
}

impl LoansService {
    pub fn new(repository: Repository, config: LoansConfig) -> Self {
        Self { repository, config }
    }

    async fn details(&self, id: i32, now: DateTime<Utc>) -> AppResult<LoanDetails> {
        let record = self.repository.loans.get_record(id).await?;
        Ok(LoanDetails::from_record(record, now))
    }

    /// Borrow a book for the acting user
    pub async fn borrow(&self, actor: &Actor, request: CreateLoan) -> AppResult<LoanDetails> {
        let user_id = actor.require_id()?;
        actor.require(Action::Borrow { borrower: user_id })?;

        let book_id = request
            .book_id
            .ok_or_else(|| AppError::Validation("book_id is required.".to_string()))?;

        let now = Utc::now();
        let due_date = request
            .due_date
            .unwrap_or_else(|| default_due_date(now, self.config.default_loan_days));

        let loan = self
            .repository
            .loans
            .borrow(NewLoan {
                user_id,
                book_id,
                borrowed_date: now,
                due_date,
                notes: request.notes,
            })
            .await?;

        tracing::info!(loan_id = loan.id, book_id, user_id, %due_date, "Book borrowed");

        self.details(loan.id, now).await
    }

    /// Return a loan; owners may return their own, admins any
    pub async fn return_loan(&self, actor: &Actor, id: i32) -> AppResult<LoanDetails> {
        actor.require_id()?;

        let loan = self.repository.loans.get_by_id(id).await?;
        actor.require(Action::ReturnLoan { owner: loan.user_id })?;

        let now = Utc::now();
        let loan = self.repository.loans.return_loan(id, now).await?;

        tracing::info!(
            loan_id = loan.id,
            book_id = loan.book_id,
            user_id = loan.user_id,
            "Book returned"
        );

        self.details(loan.id, now).await
    }

    /// Single loan; loans outside the actor's scope look missing
    pub async fn get_loan(&self, actor: &Actor, id: i32) -> AppResult<LoanDetails> {
        actor.require_id()?;

        let loan = self.repository.loans.get_by_id(id).await?;
        if actor.require(Action::ReadLoan { owner: loan.user_id }).is_err() {
            return Err(AppError::NotFound("Loan not found.".to_string()));
        }

        self.details(id, Utc::now()).await
    }

    /// All loans for admins, own loans for everyone else
    pub async fn list_loans(&self, actor: &Actor, query: &LoanQuery) -> AppResult<PaginatedResponse<LoanDetails>> {
        let user_id = actor.require_id()?;

        let owner = if authorize(actor, Action::ListAllLoans) == Decision::Allow {
            query.user_id
        } else {
            actor.require(Action::ListOwnLoans)?;
            Some(user_id)
        };

        self.search(owner, query).await
    }

    /// The acting user's own loans, whatever their role
    pub async fn my_loans(&self, actor: &Actor, query: &LoanQuery) -> AppResult<PaginatedResponse<LoanDetails>> {
        let user_id = actor.require_id()?;
        actor.require(Action::ListOwnLoans)?;

        self.search(Some(user_id), query).await
    }

    async fn search(&self, owner: Option<i32>, query: &LoanQuery) -> AppResult<PaginatedResponse<LoanDetails>> {
        let filter = LoanFilter {
            owner,
            status: query.status,
            book_id: query.book_id,
            borrowed_after: query.borrowed_after,
            borrowed_before: query.borrowed_before,
            due_after: query.due_after,
            due_before: query.due_before,
        };
        let page = self.config.page_request(query.page, query.per_page);

        let (records, total) = self.repository.loans.search(&filter, Some(page)).await?;
        let now = Utc::now();
        let items = records
            .into_iter()
            .map(|record| LoanDetails::from_record(record, now))
            .collect();

        Ok(PaginatedResponse::new(items, total, page))
    }

    /// Sweep stale active loans to overdue, then list every overdue loan
    pub async fn overdue_loans(&self, actor: &Actor) -> AppResult<Vec<LoanListEntry>> {
        actor.require(Action::ViewOverdueLoans)?;

        let now = Utc::now();
        let candidates = self.repository.loans.overdue_candidates(now).await?;
        let plan = plan_sweep(candidates, now);
        let changed = self.repository.loans.mark_overdue(&plan.changed).await?;

        for loan in plan.loans.iter().filter(|l| changed.contains(&l.id)) {
            tracing::info!(
                loan_id = loan.id,
                book_id = loan.book_id,
                user_id = loan.user_id,
                due_date = %loan.due_date,
                "Loan marked overdue"
            );
        }
        if changed.len() < plan.changed.len() {
            tracing::debug!(
                skipped = plan.changed.len() - changed.len(),
                "Loans returned during sweep were left untouched"
            );
        }

        let filter = LoanFilter {
            status: Some(LoanStatus::Overdue),
            ..Default::default()
        };
        let (records, _) = self.repository.loans.search(&filter, None).await?;

        Ok(records
            .into_iter()
            .map(|record| LoanListEntry::from(&LoanDetails::from_record(record, now)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::{
        error::LoanRule,
        models::{book::UpdateBook, user::Role},
        repository::{MockBookStore, MockLoanStore, MockUserStore},
        services::fixtures::{seed_book, seed_user},
    };

    fn service(repository: &Repository) -> LoansService {
        LoansService::new(repository.clone(), LoansConfig::default())
    }

    fn borrow_request(book_id: i32) -> CreateLoan {
        CreateLoan {
            book_id: Some(book_id),
            due_date: None,
            notes: None,
        }
    }

    async fn available(repository: &Repository, book_id: i32) -> i32 {
        repository.books.get_by_id(book_id).await.unwrap().available_copies
    }

    #[tokio::test]
    async fn test_borrow_duplicate_and_return() {
        let repository = Repository::in_memory();
        let alice = seed_user(&repository, "alice", Role::User).await;
        let book = seed_book(&repository, "9780000000001", 5, Some(5)).await;
        let loans = service(&repository);

        let loan = loans.borrow(&alice, borrow_request(book)).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.due_date - loan.borrowed_date, Duration::days(14));
        assert_eq!(loan.user.id, alice.id().unwrap());
        assert_eq!(available(&repository, book).await, 4);

        let duplicate = loans.borrow(&alice, borrow_request(book)).await;
        assert!(matches!(
            duplicate,
            Err(AppError::BusinessRule(LoanRule::DuplicateActiveLoan))
        ));
        assert_eq!(available(&repository, book).await, 4);

        let returned = loans.return_loan(&alice, loan.id).await.unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert!(returned.return_date.is_some());
        assert_eq!(available(&repository, book).await, 5);
    }

    #[tokio::test]
    async fn test_return_twice_increments_once() {
        let repository = Repository::in_memory();
        let alice = seed_user(&repository, "alice", Role::User).await;
        let book = seed_book(&repository, "9780000000001", 2, None).await;
        let loans = service(&repository);

        let loan = loans.borrow(&alice, borrow_request(book)).await.unwrap();
        loans.return_loan(&alice, loan.id).await.unwrap();
        let again = loans.return_loan(&alice, loan.id).await;

        assert!(matches!(again, Err(AppError::BusinessRule(LoanRule::AlreadyReturned))));
        assert_eq!(available(&repository, book).await, 2);
    }

    #[tokio::test]
    async fn test_borrow_unavailable_book() {
        let repository = Repository::in_memory();
        let bob = seed_user(&repository, "bob", Role::User).await;
        let book = seed_book(&repository, "9780000000001", 1, Some(0)).await;
        let loans = service(&repository);

        let result = loans.borrow(&bob, borrow_request(book)).await;

        assert!(matches!(result, Err(AppError::BusinessRule(LoanRule::BookUnavailable))));
        assert_eq!(available(&repository, book).await, 0);
        let page = loans.my_loans(&bob, &LoanQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_borrow_requires_book_id_and_existing_book() {
        let repository = Repository::in_memory();
        let alice = seed_user(&repository, "alice", Role::User).await;
        let loans = service(&repository);

        let missing_id = loans
            .borrow(
                &alice,
                CreateLoan {
                    book_id: None,
                    due_date: None,
                    notes: None,
                },
            )
            .await;
        assert!(matches!(missing_id, Err(AppError::Validation(_))));

        let missing_book = loans.borrow(&alice, borrow_request(999)).await;
        assert!(matches!(missing_book, Err(AppError::NotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_borrow_of_last_copy() {
        let repository = Repository::in_memory();
        let book = seed_book(&repository, "9780000000001", 3, Some(1)).await;
        let loans = service(&repository);

        let mut handles = Vec::new();
        for name in ["alice", "bob", "carol", "dave"] {
            let actor = seed_user(&repository, name, Role::User).await;
            let loans = loans.clone();
            handles.push(tokio::spawn(async move { loans.borrow(&actor, borrow_request(book)).await }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(e) => assert!(matches!(e, AppError::BusinessRule(LoanRule::BookUnavailable))),
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(available(&repository, book).await, 0);
    }

    #[tokio::test]
    async fn test_return_permissions() {
        let repository = Repository::in_memory();
        let alice = seed_user(&repository, "alice", Role::User).await;
        let bob = seed_user(&repository, "bob", Role::User).await;
        let admin = seed_user(&repository, "admin", Role::Admin).await;
        let book = seed_book(&repository, "9780000000001", 2, None).await;
        let loans = service(&repository);

        let loan = loans.borrow(&alice, borrow_request(book)).await.unwrap();

        assert!(matches!(
            loans.return_loan(&bob, loan.id).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            loans.return_loan(&Actor::Anonymous, loan.id).await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(loans.return_loan(&admin, 999).await, Err(AppError::NotFound(_))));

        loans.return_loan(&admin, loan.id).await.unwrap();
        assert_eq!(available(&repository, book).await, 2);
    }

    #[tokio::test]
    async fn test_listing_is_scoped_to_owner() {
        let repository = Repository::in_memory();
        let alice = seed_user(&repository, "alice", Role::User).await;
        let bob = seed_user(&repository, "bob", Role::User).await;
        let admin = seed_user(&repository, "admin", Role::Admin).await;
        let first = seed_book(&repository, "9780000000001", 2, None).await;
        let second = seed_book(&repository, "9780000000002", 2, None).await;
        let loans = service(&repository);

        let alice_loan = loans.borrow(&alice, borrow_request(first)).await.unwrap();
        loans.borrow(&bob, borrow_request(second)).await.unwrap();

        // A regular user cannot widen the scope with user_id
        let query = LoanQuery {
            user_id: bob.id(),
            ..Default::default()
        };
        let page = loans.list_loans(&alice, &query).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, alice_loan.id);

        let all = loans.list_loans(&admin, &LoanQuery::default()).await.unwrap();
        assert_eq!(all.total, 2);
        let bobs = loans.list_loans(&admin, &query).await.unwrap();
        assert_eq!(bobs.total, 1);
        assert_eq!(bobs.items[0].user.username, "bob");

        assert!(matches!(
            loans.get_loan(&bob, alice_loan.id).await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(loans.get_loan(&admin, alice_loan.id).await.unwrap().id, alice_loan.id);
    }

    #[tokio::test]
    async fn test_overdue_sweep_then_return() {
        let repository = Repository::in_memory();
        let alice = seed_user(&repository, "alice", Role::User).await;
        let admin = seed_user(&repository, "admin", Role::Admin).await;
        let late_book = seed_book(&repository, "9780000000001", 1, None).await;
        let fresh_book = seed_book(&repository, "9780000000002", 1, None).await;
        let loans = service(&repository);

        let late = loans
            .borrow(
                &alice,
                CreateLoan {
                    book_id: Some(late_book),
                    due_date: Some(Utc::now() - Duration::days(1)),
                    notes: Some("lost on the train".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(late.status, LoanStatus::Active);
        assert!(late.is_overdue);
        assert_eq!(late.days_overdue, 1);
        loans.borrow(&alice, borrow_request(fresh_book)).await.unwrap();

        let overdue = loans.overdue_loans(&admin).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].id, late.id);
        assert_eq!(overdue[0].status, LoanStatus::Overdue);
        assert_eq!(overdue[0].user_username, "alice");
        assert_eq!(
            repository.loans.get_by_id(late.id).await.unwrap().status,
            LoanStatus::Overdue
        );

        // Still listed on the next read, nothing changes
        assert_eq!(loans.overdue_loans(&admin).await.unwrap().len(), 1);

        let returned = loans.return_loan(&alice, late.id).await.unwrap();
        assert_eq!(returned.status, LoanStatus::Returned);
        assert!(!returned.is_overdue);
        assert_eq!(available(&repository, late_book).await, 1);
        assert!(loans.overdue_loans(&admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_edit_clamps_after_loans() {
        let repository = Repository::in_memory();
        let alice = seed_user(&repository, "alice", Role::User).await;
        let book = seed_book(&repository, "9780000000001", 5, Some(10)).await;
        assert_eq!(available(&repository, book).await, 5);

        let loans = service(&repository);
        let loan = loans.borrow(&alice, borrow_request(book)).await.unwrap();

        repository
            .books
            .update(
                book,
                &UpdateBook {
                    available_copies: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        loans.return_loan(&alice, loan.id).await.unwrap();

        assert_eq!(available(&repository, book).await, 5);
    }

    fn untouched_repository() -> Repository {
        let mut loans = MockLoanStore::new();
        loans.expect_borrow().never();
        loans.expect_overdue_candidates().never();
        loans.expect_mark_overdue().never();
        loans.expect_search().never();
        Repository {
            books: Arc::new(MockBookStore::new()),
            loans: Arc::new(loans),
            users: Arc::new(MockUserStore::new()),
        }
    }

    #[tokio::test]
    async fn test_denied_actors_never_reach_the_store() {
        let loans = service(&untouched_repository());
        let alice = Actor::member(1, Role::User);

        assert!(matches!(
            loans.borrow(&Actor::Anonymous, borrow_request(1)).await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            loans.overdue_loans(&alice).await,
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            loans.overdue_loans(&Actor::Anonymous).await,
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            loans.list_loans(&Actor::Anonymous, &LoanQuery::default()).await,
            Err(AppError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_skips_loans_returned_concurrently() {
        let mut stale = crate::models::loan::tests::sample_loan(Utc::now(), LoanStatus::Active, -2);
        stale.id = 7;

        let mut store = MockLoanStore::new();
        store
            .expect_overdue_candidates()
            .returning(move |_| Ok(vec![stale.clone()]));
        // The loan was returned between the read and the write
        store
            .expect_mark_overdue()
            .withf(|ids| ids.to_vec() == vec![7])
            .returning(|_| Ok(Vec::new()));
        store
            .expect_search()
            .withf(|filter, page| filter.status == Some(LoanStatus::Overdue) && page.is_none())
            .returning(|_, _| Ok((Vec::new(), 0)));

        let repository = Repository {
            books: Arc::new(MockBookStore::new()),
            loans: Arc::new(store),
            users: Arc::new(MockUserStore::new()),
        };
        let admin = Actor::member(9, Role::Admin);

        let overdue = service(&repository).overdue_loans(&admin).await.unwrap();
        assert!(overdue.is_empty());
    }
}
