use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::EntityId;

/// Role of a person credited on a movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonRole {
    Director,
    Actor,
    Writer,
}

impl PersonRole {
    /// Parses the role column. Unknown roles yield `None` and are left out of documents.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "director" => Some(PersonRole::Director),
            "actor" => Some(PersonRole::Actor),
            "writer" => Some(PersonRole::Writer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreRef {
    pub id: EntityId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonRef {
    pub id: EntityId,
    pub name: String,
}

/// Denormalized view of a movie as stored in the movies index.
///
/// Each role list holds at most one entry per person name and `genres` at most one entry per
/// genre id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDocument {
    pub id: EntityId,
    pub imdb_rating: f64,
    pub title: String,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub created: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
    pub genres: Vec<GenreRef>,
    pub directors: Vec<PersonRef>,
    pub actors: Vec<PersonRef>,
    pub writers: Vec<PersonRef>,
    pub directors_names: Vec<String>,
    pub actors_names: Vec<String>,
    pub writers_names: Vec<String>,
}

impl MovieDocument {
    /// Credits `name` under `role` unless a person with the same name is already listed.
    pub fn add_person(&mut self, role: PersonRole, id: EntityId, name: &str) {
        let (people, names) = match role {
            PersonRole::Director => (&mut self.directors, &mut self.directors_names),
            PersonRole::Actor => (&mut self.actors, &mut self.actors_names),
            PersonRole::Writer => (&mut self.writers, &mut self.writers_names),
        };

        if names.iter().any(|existing| existing == name) {
            return;
        }

        names.push(name.to_owned());
        people.push(PersonRef {
            id,
            name: name.to_owned(),
        });
    }

    /// Adds a genre unless one with the same id is already listed.
    pub fn add_genre(&mut self, id: EntityId, name: &str) {
        if self.genres.iter().any(|genre| genre.id == id) {
            return;
        }

        self.genres.push(GenreRef {
            id,
            name: name.to_owned(),
        });
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonFilm {
    pub id: EntityId,
    pub title: String,
    pub roles: Vec<PersonRole>,
}

/// A person and the movies they are credited on, stored in the persons index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonDocument {
    pub id: EntityId,
    pub full_name: String,
    pub films: Vec<PersonFilm>,
}

impl PersonDocument {
    /// Records `role` on the film `id`, adding the film on first sight.
    pub fn add_credit(&mut self, id: EntityId, title: &str, role: Option<PersonRole>) {
        let film = match self.films.iter_mut().position(|film| film.id == id) {
            Some(position) => &mut self.films[position],
            None => {
                self.films.push(PersonFilm {
                    id,
                    title: title.to_owned(),
                    roles: Vec::new(),
                });
                let last = self.films.len() - 1;
                &mut self.films[last]
            }
        };

        if let Some(role) = role {
            if !film.roles.contains(&role) {
                film.roles.push(role);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreFilm {
    pub id: EntityId,
    pub title: String,
}

/// Genre view of the catalog: the genre and every movie tagged with it, each listed once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreDocument {
    pub id: EntityId,
    pub name: String,
    pub description: Option<String>,
    pub films: Vec<GenreFilm>,
}

impl GenreDocument {
    pub fn add_film(&mut self, id: EntityId, title: &str) {
        if self.films.iter().any(|film| film.id == id) {
            return;
        }

        self.films.push(GenreFilm {
            id,
            title: title.to_owned(),
        });
    }
}
