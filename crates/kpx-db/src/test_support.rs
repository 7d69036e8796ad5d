//! Shared test utilities for kpx-db unit tests.

#[cfg(test)]
pub(crate) mod helpers {
    use chrono::NaiveDate;
    use kpx_core::entities::{Grid, GridItem, UserProfile};
    use kpx_core::enums::{ContentType, GridStatus, Role};
    use kpx_core::identity::Actor;

    use crate::KpxDb;
    use crate::repos::{NewGridItem, NewUser};
    use crate::service::KpxService;

    /// Create an in-memory `KpxService`.
    pub async fn test_service() -> KpxService {
        let db = KpxDb::open_local(":memory:").await.unwrap();
        KpxService::from_db(db)
    }

    /// Create a company and return its ID.
    pub async fn seed_company(svc: &KpxService, name: &str) -> String {
        svc.create_company(name).await.unwrap().id
    }

    /// Create a staff user (admin or designer).
    pub async fn seed_user(svc: &KpxService, role: Role, email: &str) -> UserProfile {
        svc.create_user(&NewUser {
            email: email.into(),
            full_name: None,
            role,
            company_id: None,
        })
        .await
        .unwrap()
    }

    /// Create a client user of a company.
    pub async fn seed_client(svc: &KpxService, company_id: &str, email: &str) -> UserProfile {
        svc.create_user(&NewUser {
            email: email.into(),
            full_name: None,
            role: Role::Client,
            company_id: Some(company_id.into()),
        })
        .await
        .unwrap()
    }

    /// An agency with one admin, one designer, and a client at each of two
    /// companies ("Acme Coffee" and "Globex").
    pub struct Seeded {
        pub company_id: String,
        pub other_company_id: String,
        pub admin: Actor,
        pub designer: Actor,
        pub client: Actor,
        /// Client of the other company.
        pub outsider: Actor,
    }

    pub async fn seeded_service() -> (KpxService, Seeded) {
        let svc = test_service().await;
        let company_id = seed_company(&svc, "Acme Coffee").await;
        let other_company_id = seed_company(&svc, "Globex").await;
        let admin = seed_user(&svc, Role::Admin, "admin@agency.test").await;
        let designer = seed_user(&svc, Role::Designer, "designer@agency.test").await;
        let client = seed_client(&svc, &company_id, "owner@acme.test").await;
        let outsider = seed_client(&svc, &other_company_id, "owner@globex.test").await;
        let seeded = Seeded {
            company_id,
            other_company_id,
            admin: admin.to_actor(),
            designer: designer.to_actor(),
            client: client.to_actor(),
            outsider: outsider.to_actor(),
        };
        (svc, seeded)
    }

    impl Seeded {
        /// A draft grid for Acme Coffee, March 2026.
        pub async fn draft_grid(&self, svc: &KpxService) -> Grid {
            svc.create_grid(&self.designer, &self.company_id, 3, 2026)
                .await
                .unwrap()
        }

        /// A March 2026 grid driven into `status` through real transitions.
        pub async fn grid_in(&self, svc: &KpxService, status: GridStatus) -> Grid {
            let grid = self.draft_grid(svc).await;
            if status == GridStatus::Draft {
                return grid;
            }
            let sent = svc
                .transition_grid(&self.admin, &grid.id, "send", None)
                .await
                .unwrap();
            match status {
                GridStatus::Approved => svc
                    .transition_grid(&self.client, &grid.id, "approve", None)
                    .await
                    .unwrap(),
                GridStatus::ChangesRequested => svc
                    .transition_grid(&self.client, &grid.id, "request_changes", None)
                    .await
                    .unwrap(),
                _ => sent,
            }
        }

        /// Add a post on the given day of the grid's month.
        pub async fn add_item(
            &self,
            svc: &KpxService,
            grid: &Grid,
            day: u32,
            topic: &str,
        ) -> GridItem {
            let date = NaiveDate::from_ymd_opt(grid.year, grid.month, day).unwrap();
            svc.add_grid_item(
                &self.designer,
                &grid.id,
                &NewGridItem {
                    date,
                    content_type: ContentType::Post,
                    topic: topic.into(),
                    description: None,
                    status: None,
                },
            )
            .await
            .unwrap()
        }
    }
}
